// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use axum::http::StatusCode;
use axum::response::IntoResponse;
use impute_portal::error::AppError;

mod common;
use common::body_json;

#[test]
fn test_is_token_rejection_matches() {
    let err = AppError::Identity(AppError::IDENTITY_TOKEN_REJECTED.to_string());
    assert!(err.is_token_rejection());
}

#[test]
fn test_is_token_rejection_no_match() {
    let err = AppError::Identity("invalid_grant".to_string());
    assert!(!err.is_token_rejection());

    let err = AppError::ExternalService(AppError::IDENTITY_TOKEN_REJECTED.to_string());
    assert!(!err.is_token_rejection());

    assert!(!AppError::Unauthorized.is_token_rejection());
}

#[test]
fn test_is_unknown_external_job() {
    let err = AppError::ExternalService(AppError::EXTERNAL_JOB_NOT_FOUND.to_string());
    assert!(err.is_unknown_external_job());

    let err = AppError::ExternalService("HTTP 503".to_string());
    assert!(!err.is_unknown_external_job());

    let err = AppError::NotFound(AppError::EXTERNAL_JOB_NOT_FOUND.to_string());
    assert!(!err.is_unknown_external_job());
}

#[tokio::test]
async fn test_status_codes_and_error_codes() {
    let cases = [
        (AppError::InvalidState, StatusCode::BAD_REQUEST, "invalid_state"),
        (AppError::Unauthorized, StatusCode::UNAUTHORIZED, "unauthorized"),
        (
            AppError::NotFound("File x".to_string()),
            StatusCode::NOT_FOUND,
            "not_found",
        ),
        (
            AppError::BadRequest("bad".to_string()),
            StatusCode::BAD_REQUEST,
            "bad_request",
        ),
        (
            AppError::DuplicateJob("J1".to_string()),
            StatusCode::CONFLICT,
            "duplicate_job",
        ),
        (
            AppError::Identity("invalid_grant".to_string()),
            StatusCode::BAD_GATEWAY,
            "identity_error",
        ),
        (
            AppError::ExternalService("HTTP 503".to_string()),
            StatusCode::BAD_GATEWAY,
            "imputation_service_error",
        ),
        (
            AppError::Database("connection reset".to_string()),
            StatusCode::INTERNAL_SERVER_ERROR,
            "database_error",
        ),
        (
            AppError::Internal(anyhow::anyhow!("boom")),
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
        ),
    ];

    for (err, status, code) in cases {
        let response = err.into_response();
        assert_eq!(response.status(), status, "{}", code);
        let body = body_json(response).await;
        assert_eq!(body["error"], code);
    }
}

#[tokio::test]
async fn test_internal_details_not_exposed() {
    let response = AppError::Database("password=hunter2".to_string()).into_response();
    let body = body_json(response).await;
    assert!(body.get("details").is_none());

    let response = AppError::Identity("client_secret mismatch".to_string()).into_response();
    let body = body_json(response).await;
    assert!(body.get("details").is_none());

    let response = AppError::DuplicateJob("J1".to_string()).into_response();
    let body = body_json(response).await;
    assert_eq!(body["details"], "J1");
}
