// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google login and access-token validation.
//!
//! Login: `login_url` issues a state nonce and the consent URL;
//! `handle_callback` checks the nonce, exchanges the code, fetches the
//! profile and upserts the user.
//!
//! Validation: `validate` turns an encrypted access token (as handed to
//! the frontend after login) back into a user profile, or a rejection
//! reason. It never returns an error.

use std::fmt;
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::models::{User, UserProfile};
use crate::services::cipher::TokenCipher;
use crate::services::google::IdentityProvider;
use crate::services::oauth_state::OAuthStateStore;
use crate::services::users::UserService;

/// Where to send the browser to start a login.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub url: String,
    /// Nonce embedded in `url`; the caller binds it to the browser.
    pub state: String,
}

/// Why a token was not accepted. Logged, never sent to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingToken,
    Undecryptable,
    ProviderRejected,
    EmptyProfile,
    UnknownUser,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingToken => "missing_token",
            RejectReason::Undecryptable => "undecryptable",
            RejectReason::ProviderRejected => "provider_rejected",
            RejectReason::EmptyProfile => "empty_profile",
            RejectReason::UnknownUser => "unknown_user",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of validating an access token.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Authenticated(UserProfile),
    Rejected(RejectReason),
}

impl ValidationOutcome {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, ValidationOutcome::Authenticated(_))
    }
}

/// Login and token validation against an identity provider.
#[derive(Clone)]
pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    users: UserService,
    states: OAuthStateStore,
    cipher: TokenCipher,
}

impl AuthService {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        users: UserService,
        states: OAuthStateStore,
        cipher: TokenCipher,
    ) -> Self {
        Self {
            provider,
            users,
            states,
            cipher,
        }
    }

    /// Start a login. No network call.
    pub fn login_url(&self) -> Result<LoginRedirect, AppError> {
        let state = self.states.issue()?;
        let url = self.provider.authorization_url(&state);
        Ok(LoginRedirect { url, state })
    }

    /// Complete a login from the provider's redirect.
    ///
    /// `cookie_state` is the nonce the browser carried back; it must equal
    /// `state`, and `state` must be an unexpired nonce we issued.
    pub async fn handle_callback(
        &self,
        code: &str,
        state: &str,
        cookie_state: Option<&str>,
    ) -> Result<User, AppError> {
        // Consume first so a nonce can never be replayed, even after a mismatch.
        let issued = self.states.consume(state);
        let bound = cookie_state
            .map(|c| bool::from(c.as_bytes().ct_eq(state.as_bytes())))
            .unwrap_or(false);

        if !issued || !bound {
            tracing::warn!(issued, bound, "Rejected OAuth callback state");
            return Err(AppError::InvalidState);
        }

        tracing::info!("Exchanging authorization code for tokens");
        let tokens = self.provider.exchange_code(code).await?;
        let profile = self.provider.user_info(&tokens.access_token).await?;

        let user = self.users.upsert_from_login(&profile, &tokens).await?;

        tracing::info!(
            user_id = %user.id,
            has_refresh_token = tokens.refresh_token.is_some(),
            "Login complete"
        );

        Ok(user)
    }

    /// Check an encrypted access token. Fails closed.
    pub async fn validate(&self, token: Option<&str>) -> ValidationOutcome {
        match self.check_token(token).await {
            Ok(profile) => {
                tracing::debug!(user_id = %profile.user_id, "Token validated");
                ValidationOutcome::Authenticated(profile)
            }
            Err(reason) => {
                tracing::info!(reason = %reason, "Token rejected");
                ValidationOutcome::Rejected(reason)
            }
        }
    }

    async fn check_token(&self, token: Option<&str>) -> Result<UserProfile, RejectReason> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(RejectReason::MissingToken)?;

        let access_token = self
            .cipher
            .decrypt(token)
            .map_err(|_| RejectReason::Undecryptable)?;

        let profile = self
            .provider
            .user_info(&access_token)
            .await
            .map_err(|e| {
                if !e.is_token_rejection() {
                    tracing::warn!(error = %e, "Userinfo lookup failed");
                }
                RejectReason::ProviderRejected
            })?;

        if profile.id.is_empty() {
            return Err(RejectReason::EmptyProfile);
        }

        let user = self
            .users
            .find_by_email(&profile.email)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "User lookup failed during validation");
                RejectReason::UnknownUser
            })?
            .ok_or(RejectReason::UnknownUser)?;

        Ok(UserProfile::from(&user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryDb, UserStore};
    use crate::services::google::{ProviderProfile, ProviderTokens};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Mutex, OnceLock};

    fn cipher() -> TokenCipher {
        static CIPHER: OnceLock<TokenCipher> = OnceLock::new();
        CIPHER
            .get_or_init(|| TokenCipher::from_secret("auth-test-secret").unwrap())
            .clone()
    }

    /// Hands out queued token pairs and a fixed profile.
    struct StubProvider {
        tokens: Mutex<VecDeque<ProviderTokens>>,
        profile: ProviderProfile,
    }

    impl StubProvider {
        fn new(pairs: &[(&str, &str)]) -> Self {
            let tokens = pairs
                .iter()
                .map(|(access, refresh)| ProviderTokens {
                    access_token: access.to_string(),
                    refresh_token: Some(refresh.to_string()),
                    expires_in: Some(3599),
                })
                .collect();
            Self {
                tokens: Mutex::new(tokens),
                profile: ProviderProfile {
                    id: "g-1".to_string(),
                    email: "a@b.com".to_string(),
                    name: Some("A".to_string()),
                    picture: Some("url".to_string()),
                },
            }
        }
    }

    #[async_trait]
    impl IdentityProvider for StubProvider {
        fn authorization_url(&self, state: &str) -> String {
            format!("https://idp.test/auth?state={}", state)
        }

        async fn exchange_code(&self, _code: &str) -> Result<ProviderTokens, AppError> {
            self.tokens
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AppError::Identity("invalid_grant".to_string()))
        }

        async fn user_info(&self, access_token: &str) -> Result<ProviderProfile, AppError> {
            match access_token {
                "revoked" => Err(AppError::Identity(
                    AppError::IDENTITY_TOKEN_REJECTED.to_string(),
                )),
                "anonymous" => Ok(ProviderProfile::default()),
                "stranger" => Ok(ProviderProfile {
                    id: "g-2".to_string(),
                    email: "nobody@b.com".to_string(),
                    ..ProviderProfile::default()
                }),
                _ => Ok(self.profile.clone()),
            }
        }
    }

    fn service(provider: StubProvider, db: &MemoryDb) -> AuthService {
        let users = UserService::new(Arc::new(db.clone()), cipher());
        AuthService::new(Arc::new(provider), users, OAuthStateStore::new(), cipher())
    }

    async fn login(auth: &AuthService) -> Result<User, AppError> {
        let redirect = auth.login_url()?;
        auth.handle_callback("code", &redirect.state, Some(&redirect.state))
            .await
    }

    #[tokio::test]
    async fn test_repeat_login_updates_same_user() {
        let db = MemoryDb::new();
        let auth = service(StubProvider::new(&[("AT1", "RT1"), ("AT2", "RT2")]), &db);

        let first = login(&auth).await.unwrap();

        assert_eq!(db.user_count(), 1);
        let stored = db.find_by_email("a@b.com").await.unwrap().unwrap();
        assert_ne!(stored.access_token_encrypted, "AT1");
        assert_ne!(stored.refresh_token_encrypted.as_deref(), Some("RT1"));
        assert_eq!(stored.display_name, "A");
        assert_eq!(stored.avatar_url.as_deref(), Some("url"));

        let second = login(&auth).await.unwrap();

        assert_eq!(db.user_count(), 1);
        assert_eq!(first.id, second.id);

        let users = UserService::new(Arc::new(db.clone()), cipher());
        let decrypted = users.find_decrypted(&second.id).await.unwrap().unwrap();
        assert_eq!(decrypted.access_token, "AT2");
        assert_eq!(decrypted.refresh_token.as_deref(), Some("RT2"));
    }

    #[tokio::test]
    async fn test_login_url_embeds_issued_state() {
        let db = MemoryDb::new();
        let auth = service(StubProvider::new(&[]), &db);

        let redirect = auth.login_url().unwrap();
        assert!(redirect.url.ends_with(&redirect.state));
    }

    #[tokio::test]
    async fn test_callback_rejects_bad_state() {
        let db = MemoryDb::new();
        let auth = service(StubProvider::new(&[("AT1", "RT1")]), &db);

        // Never issued
        let err = auth
            .handle_callback("code", "forged", Some("forged"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState));

        // Cookie missing
        let redirect = auth.login_url().unwrap();
        let err = auth
            .handle_callback("code", &redirect.state, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState));

        // Cookie from another login
        let a = auth.login_url().unwrap();
        let b = auth.login_url().unwrap();
        let err = auth
            .handle_callback("code", &a.state, Some(&b.state))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState));

        assert_eq!(db.user_count(), 0);
    }

    #[tokio::test]
    async fn test_callback_state_is_single_use() {
        let db = MemoryDb::new();
        let auth = service(StubProvider::new(&[("AT1", "RT1"), ("AT2", "RT2")]), &db);

        let redirect = auth.login_url().unwrap();
        auth.handle_callback("code", &redirect.state, Some(&redirect.state))
            .await
            .unwrap();

        let err = auth
            .handle_callback("code", &redirect.state, Some(&redirect.state))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidState));
    }

    #[tokio::test]
    async fn test_callback_propagates_provider_error() {
        let db = MemoryDb::new();
        let auth = service(StubProvider::new(&[]), &db);

        let err = login(&auth).await.unwrap_err();
        assert!(matches!(err, AppError::Identity(_)));
        assert_eq!(db.user_count(), 0);
    }

    #[tokio::test]
    async fn test_validate_accepts_issued_token() {
        let db = MemoryDb::new();
        let auth = service(StubProvider::new(&[("AT1", "RT1")]), &db);
        let user = login(&auth).await.unwrap();

        let outcome = auth.validate(Some(&user.access_token_encrypted)).await;

        assert_eq!(
            outcome,
            ValidationOutcome::Authenticated(UserProfile {
                user_id: user.id.clone(),
                email: "a@b.com".to_string(),
                avatar_url: Some("url".to_string()),
                display_name: "A".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn test_validate_rejection_reasons() {
        let db = MemoryDb::new();
        let auth = service(StubProvider::new(&[("AT1", "RT1")]), &db);
        login(&auth).await.unwrap();

        let c = cipher();
        let cases = [
            (None, RejectReason::MissingToken),
            (Some("   ".to_string()), RejectReason::MissingToken),
            (Some("not-a-token".to_string()), RejectReason::Undecryptable),
            (Some(c.encrypt("revoked").unwrap()), RejectReason::ProviderRejected),
            (Some(c.encrypt("anonymous").unwrap()), RejectReason::EmptyProfile),
            (Some(c.encrypt("stranger").unwrap()), RejectReason::UnknownUser),
        ];

        for (token, expected) in cases {
            let outcome = auth.validate(token.as_deref()).await;
            assert_eq!(outcome, ValidationOutcome::Rejected(expected));
            assert!(!outcome.is_authenticated());
        }
    }

    #[tokio::test]
    async fn test_validate_rejects_foreign_key_token() {
        let db = MemoryDb::new();
        let auth = service(StubProvider::new(&[]), &db);
        let foreign = TokenCipher::from_secret("someone-else").unwrap();

        let outcome = auth
            .validate(Some(&foreign.encrypt("AT1").unwrap()))
            .await;
        assert_eq!(
            outcome,
            ValidationOutcome::Rejected(RejectReason::Undecryptable)
        );
    }
}
