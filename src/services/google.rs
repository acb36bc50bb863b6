// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth2 client.
//!
//! Handles:
//! - Consent URL construction
//! - Authorization code exchange
//! - Userinfo lookups with a caller-supplied access token

use crate::error::AppError;
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Scopes requested at login.
pub const LOGIN_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// Tokens returned by the code exchange.
#[derive(Clone, Deserialize)]
pub struct ProviderTokens {
    pub access_token: String,
    /// Only present on first consent (or when consent is forced).
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl fmt::Debug for ProviderTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderTokens")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Profile from the userinfo endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProviderProfile {
    /// Provider user ID
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

/// An OAuth2 identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent URL carrying the given anti-forgery state. No network call.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for tokens.
    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens, AppError>;

    /// Fetch the profile belonging to an access token.
    async fn user_info(&self, access_token: &str) -> Result<ProviderProfile, AppError>;
}

/// Google endpoint URLs (overridable for tests).
#[derive(Debug, Clone)]
pub struct GoogleEndpoints {
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token_url: "https://oauth2.googleapis.com/token".to_string(),
            userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
        }
    }
}

/// Google OAuth2 client.
#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    endpoints: GoogleEndpoints,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl GoogleClient {
    /// Create a client against the production Google endpoints.
    pub fn new(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Result<Self, AppError> {
        Self::with_endpoints(client_id, client_secret, redirect_uri, GoogleEndpoints::default())
    }

    pub fn with_endpoints(
        client_id: String,
        client_secret: String,
        redirect_uri: String,
        endpoints: GoogleEndpoints,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            endpoints,
            client_id,
            client_secret,
            redirect_uri,
        })
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 401 {
                return Err(AppError::Identity(
                    AppError::IDENTITY_TOKEN_REJECTED.to_string(),
                ));
            }

            tracing::warn!(status = %status, body = %body, "Google request failed");
            return Err(AppError::Identity(format!("HTTP {}", status)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Identity(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl IdentityProvider for GoogleClient {
    fn authorization_url(&self, state: &str) -> String {
        format!(
            "{}?\
             client_id={}&\
             redirect_uri={}&\
             response_type=code&\
             scope={}&\
             access_type=offline&\
             include_granted_scopes=true&\
             state={}",
            self.endpoints.auth_url,
            urlencoding::encode(&self.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&LOGIN_SCOPES.join(" ")),
            urlencoding::encode(state)
        )
    }

    async fn exchange_code(&self, code: &str) -> Result<ProviderTokens, AppError> {
        let response = self
            .http
            .post(&self.endpoints.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Identity(format!("Token exchange failed: {}", e)))?;

        Self::check_response_json(response).await
    }

    async fn user_info(&self, access_token: &str) -> Result<ProviderProfile, AppError> {
        let response = self
            .http
            .get(&self.endpoints.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::Identity(format!("Userinfo request failed: {}", e)))?;

        Self::check_response_json(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client_for(server: &Server) -> GoogleClient {
        GoogleClient::with_endpoints(
            "cid".to_string(),
            "csecret".to_string(),
            "http://localhost:3000/api/v1/auth/google/callback".to_string(),
            GoogleEndpoints {
                auth_url: format!("{}/o/oauth2/v2/auth", server.url()),
                token_url: format!("{}/token", server.url()),
                userinfo_url: format!("{}/oauth2/v2/userinfo", server.url()),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_authorization_url_parameters() {
        let client = GoogleClient::new(
            "cid".to_string(),
            "csecret".to_string(),
            "http://localhost:3000/cb".to_string(),
        )
        .unwrap();

        let url = client.authorization_url("nonce-123");

        assert!(url.starts_with("https://accounts.google.com/o/oauth2/v2/auth?"));
        assert!(url.contains("client_id=cid"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcb"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("userinfo.email"));
        assert!(url.contains("userinfo.profile"));
        assert!(url.contains("state=nonce-123"));
        assert!(!url.contains("csecret"));
    }

    #[tokio::test]
    async fn test_exchange_code() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("code".into(), "auth-code".into()),
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("client_secret".into(), "csecret".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"AT1","refresh_token":"RT1","expires_in":3599,"token_type":"Bearer"}"#,
            )
            .create_async()
            .await;

        let tokens = client_for(&server).exchange_code("auth-code").await.unwrap();

        assert_eq!(tokens.access_token, "AT1");
        assert_eq!(tokens.refresh_token.as_deref(), Some("RT1"));
        assert_eq!(tokens.expires_in, Some(3599));
    }

    #[tokio::test]
    async fn test_exchange_code_without_refresh_token() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"AT2","expires_in":3599}"#)
            .create_async()
            .await;

        let tokens = client_for(&server).exchange_code("code").await.unwrap();
        assert!(tokens.refresh_token.is_none());
    }

    #[tokio::test]
    async fn test_exchange_code_rejected() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_grant"}"#)
            .create_async()
            .await;

        let err = client_for(&server).exchange_code("stale").await.unwrap_err();
        assert!(matches!(err, AppError::Identity(_)));
        assert!(!err.is_token_rejection());
    }

    #[tokio::test]
    async fn test_user_info_sends_bearer_token() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/oauth2/v2/userinfo")
            .match_header("authorization", "Bearer AT1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"1234","email":"a@b.com","verified_email":true,"name":"A","picture":"url"}"#,
            )
            .create_async()
            .await;

        let profile = client_for(&server).user_info("AT1").await.unwrap();

        assert_eq!(profile.id, "1234");
        assert_eq!(profile.email, "a@b.com");
        assert_eq!(profile.name.as_deref(), Some("A"));
        assert_eq!(profile.picture.as_deref(), Some("url"));
    }

    #[tokio::test]
    async fn test_user_info_unauthorized() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/oauth2/v2/userinfo")
            .with_status(401)
            .with_body(r#"{"error":"invalid_token"}"#)
            .create_async()
            .await;

        let err = client_for(&server).user_info("expired").await.unwrap_err();
        assert!(err.is_token_rejection());
    }

    #[test]
    fn test_tokens_debug_redacted() {
        let tokens = ProviderTokens {
            access_token: "AT1".to_string(),
            refresh_token: Some("RT1".to_string()),
            expires_in: None,
        };
        let printed = format!("{:?}", tokens);
        assert!(!printed.contains("AT1"));
        assert!(!printed.contains("RT1"));
    }
}
