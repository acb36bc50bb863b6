// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Invalid OAuth state parameter")]
    InvalidState,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Job already registered: {0}")]
    DuplicateJob(String),

    #[error("Identity provider error: {0}")]
    Identity(String),

    #[error("Imputation service error: {0}")]
    ExternalService(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Message used when the provider rejects a bearer token (HTTP 401).
    pub const IDENTITY_TOKEN_REJECTED: &'static str = "Access token rejected by provider";

    /// Message used when the imputation service does not know a job (HTTP 404).
    pub const EXTERNAL_JOB_NOT_FOUND: &'static str = "Job not found on imputation service";

    /// True when the identity provider refused the presented access token.
    pub fn is_token_rejection(&self) -> bool {
        matches!(self, AppError::Identity(msg) if msg == Self::IDENTITY_TOKEN_REJECTED)
    }

    /// True when the imputation service reported that the job does not exist.
    pub fn is_unknown_external_job(&self) -> bool {
        matches!(self, AppError::ExternalService(msg) if msg == Self::EXTERNAL_JOB_NOT_FOUND)
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::InvalidState => (StatusCode::BAD_REQUEST, "invalid_state", None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::DuplicateJob(msg) => {
                (StatusCode::CONFLICT, "duplicate_job", Some(msg.clone()))
            }
            AppError::Identity(msg) => {
                tracing::warn!(error = %msg, "Identity provider error");
                (StatusCode::BAD_GATEWAY, "identity_error", None)
            }
            AppError::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "imputation_service_error",
                Some(msg.clone()),
            ),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
