// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Google OAuth routes and token validation.

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::Result;
use crate::models::UserProfile;
use crate::services::{RejectReason, ValidationOutcome};
use crate::AppState;

/// Cookie binding the OAuth state nonce to the browser that started the login.
pub const STATE_COOKIE: &str = "oauth_state";

const AUTH_PATH: &str = "/api/v1/auth/google";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/auth/google/login", get(login))
        .route("/api/v1/auth/google/callback", get(callback))
        .route("/api/v1/auth/google/user", post(validate_user))
}

/// 302 Found. Browsers follow it with a GET, like the provider expects.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Start OAuth flow - redirect to Google consent.
async fn login(State(state): State<Arc<AppState>>, jar: CookieJar) -> Result<(CookieJar, Response)> {
    let redirect = state.auth.login_url()?;

    let cookie = Cookie::build((STATE_COOKIE, redirect.state))
        .path(AUTH_PATH)
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.google_redirect_uri.starts_with("https://"))
        .max_age(time::Duration::minutes(10))
        .build();

    tracing::info!("Starting OAuth flow, redirecting to Google");

    Ok((jar.add(cookie), found(&redirect.url)))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code, upsert user, hand the frontend its token.
async fn callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> (CookieJar, Response) {
    let frontend = state.config.frontend_url.trim_end_matches('/');
    let fail_url = format!("{}/auth/google/fail", frontend);

    let cookie_state = jar.get(STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(Cookie::build(STATE_COOKIE).path(AUTH_PATH));

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from Google");
        return (jar, found(&fail_url));
    }

    let (Some(code), Some(oauth_state)) = (params.code, params.state) else {
        tracing::warn!("OAuth callback without code or state");
        return (jar, found(&fail_url));
    };

    match state
        .auth
        .handle_callback(&code, &oauth_state, cookie_state.as_deref())
        .await
    {
        Ok(user) => {
            let success_url = format!(
                "{}/admin/?user={}",
                frontend,
                urlencoding::encode(&user.access_token_encrypted)
            );
            (jar, found(&success_url))
        }
        Err(e) => {
            tracing::warn!(error = %e, "OAuth callback failed");
            (jar, found(&fail_url))
        }
    }
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    #[serde(default)]
    token: Option<String>,
}

/// Validation result. Only the boolean and a generic message leave the server.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "client/src/lib/generated/")
)]
pub struct ValidateResponse {
    pub is_authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<ValidationOutcome> for ValidateResponse {
    fn from(outcome: ValidationOutcome) -> Self {
        match outcome {
            ValidationOutcome::Authenticated(profile) => Self {
                is_authenticated: true,
                user: Some(profile),
                message: None,
            },
            ValidationOutcome::Rejected(reason) => {
                let message = match reason {
                    RejectReason::MissingToken => "No token provided",
                    _ => "Invalid or expired token",
                };
                Self {
                    is_authenticated: false,
                    user: None,
                    message: Some(message.to_string()),
                }
            }
        }
    }
}

/// Check an encrypted access token. Always 200.
async fn validate_user(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<ValidateRequest>, JsonRejection>,
) -> Json<ValidateResponse> {
    let token = match body {
        Ok(Json(req)) => req.token,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Malformed validation request");
            None
        }
    };

    let outcome = state.auth.validate(token.as_deref()).await;
    Json(ValidateResponse::from(outcome))
}
