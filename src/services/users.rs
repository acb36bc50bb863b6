// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User records with tokens encrypted on write and decrypted on read.

use std::sync::Arc;

use crate::db::UserStore;
use crate::error::AppError;
use crate::models::{DecryptedUser, User, UserUpsert};
use crate::services::cipher::{decrypt_tokens, encrypt_tokens, TokenCipher};
use crate::services::google::{ProviderProfile, ProviderTokens};

/// User persistence on top of a [`UserStore`].
#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    cipher: TokenCipher,
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, cipher: TokenCipher) -> Self {
        Self { store, cipher }
    }

    /// Create or update the user for a completed login.
    pub async fn upsert_from_login(
        &self,
        profile: &ProviderProfile,
        tokens: &ProviderTokens,
    ) -> Result<User, AppError> {
        if profile.email.is_empty() {
            return Err(AppError::Identity("Profile has no email".to_string()));
        }

        let (access_token_encrypted, refresh_token_encrypted) = encrypt_tokens(
            &self.cipher,
            &tokens.access_token,
            tokens.refresh_token.as_deref(),
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Token encryption failed: {}", e)))?;

        let upsert = UserUpsert {
            email: profile.email.clone(),
            display_name: profile
                .name
                .clone()
                .unwrap_or_else(|| profile.email.clone()),
            avatar_url: profile.picture.clone(),
            access_token_encrypted,
            refresh_token_encrypted,
        };

        self.store.upsert_by_email(upsert).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        self.store.find_by_email(email).await
    }

    /// Load a user and decrypt the stored tokens.
    pub async fn find_decrypted(&self, id: &str) -> Result<Option<DecryptedUser>, AppError> {
        let Some(user) = self.store.find_by_id(id).await? else {
            return Ok(None);
        };

        let (access_token, refresh_token) = decrypt_tokens(
            &self.cipher,
            &user.access_token_encrypted,
            user.refresh_token_encrypted.as_deref(),
        )
        .map_err(|e| {
            tracing::error!(user_id = %user.id, error = %e, "Stored tokens do not decrypt");
            AppError::Internal(anyhow::anyhow!("Stored tokens do not decrypt"))
        })?;

        Ok(Some(DecryptedUser {
            id: user.id,
            display_name: user.display_name,
            email: user.email,
            avatar_url: user.avatar_url,
            access_token,
            refresh_token,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryDb;
    use std::sync::OnceLock;

    fn cipher() -> TokenCipher {
        static CIPHER: OnceLock<TokenCipher> = OnceLock::new();
        CIPHER
            .get_or_init(|| TokenCipher::from_secret("users-test-secret").unwrap())
            .clone()
    }

    fn profile(name: Option<&str>) -> ProviderProfile {
        ProviderProfile {
            id: "g-1".to_string(),
            email: "a@b.com".to_string(),
            name: name.map(str::to_string),
            picture: Some("url".to_string()),
        }
    }

    fn tokens(access: &str, refresh: Option<&str>) -> ProviderTokens {
        ProviderTokens {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in: Some(3599),
        }
    }

    #[tokio::test]
    async fn test_tokens_encrypted_at_rest() {
        let db = MemoryDb::new();
        let service = UserService::new(Arc::new(db.clone()), cipher());

        let user = service
            .upsert_from_login(&profile(Some("A")), &tokens("AT1", Some("RT1")))
            .await
            .unwrap();

        assert_ne!(user.access_token_encrypted, "AT1");
        assert_ne!(user.refresh_token_encrypted.as_deref(), Some("RT1"));
        assert_eq!(user.display_name, "A");

        let decrypted = service.find_decrypted(&user.id).await.unwrap().unwrap();
        assert_eq!(decrypted.access_token, "AT1");
        assert_eq!(decrypted.refresh_token.as_deref(), Some("RT1"));
    }

    #[tokio::test]
    async fn test_repeat_login_without_refresh_token_keeps_old_one() {
        let db = MemoryDb::new();
        let service = UserService::new(Arc::new(db.clone()), cipher());

        let first = service
            .upsert_from_login(&profile(Some("A")), &tokens("AT1", Some("RT1")))
            .await
            .unwrap();
        let second = service
            .upsert_from_login(&profile(Some("A")), &tokens("AT2", None))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(db.user_count(), 1);

        let decrypted = service.find_decrypted(&second.id).await.unwrap().unwrap();
        assert_eq!(decrypted.access_token, "AT2");
        assert_eq!(decrypted.refresh_token.as_deref(), Some("RT1"));
    }

    #[tokio::test]
    async fn test_display_name_falls_back_to_email() {
        let service = UserService::new(Arc::new(MemoryDb::new()), cipher());

        let user = service
            .upsert_from_login(&profile(None), &tokens("AT1", None))
            .await
            .unwrap();

        assert_eq!(user.display_name, "a@b.com");
    }

    #[tokio::test]
    async fn test_profile_without_email_rejected() {
        let service = UserService::new(Arc::new(MemoryDb::new()), cipher());
        let mut no_email = profile(Some("A"));
        no_email.email.clear();

        let err = service
            .upsert_from_login(&no_email, &tokens("AT1", None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Identity(_)));
    }

    #[tokio::test]
    async fn test_find_decrypted_missing_user() {
        let service = UserService::new(Arc::new(MemoryDb::new()), cipher());
        assert!(service.find_decrypted("nope").await.unwrap().is_none());
    }
}
