// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client for this service's own HTTP API, as used by the uploader.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::error::AppError;
use crate::models::{JobResponse, JobStatus};
use crate::routes::auth::ValidateResponse;
use crate::routes::files::{FileListResponse, FileResponse};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
    #[serde(default)]
    details: Option<String>,
}

/// Files API client.
#[derive(Clone)]
pub struct FilesApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl FilesApiClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Record a job started on the imputation service.
    pub async fn register(
        &self,
        user_id: &str,
        external_job_id: &str,
        status: JobStatus,
    ) -> Result<JobResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/api/v1/files", self.base_url))
            .json(&json!({
                "userId": user_id,
                "externalJobId": external_job_id,
                "status": status,
            }))
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Register failed: {}", e)))?;

        let body: FileResponse = check_response_json(response).await?;
        Ok(body.file)
    }

    /// A user's jobs. With `refresh`, the server reconciles statuses first.
    pub async fn list(&self, user_id: &str, refresh: bool) -> Result<Vec<JobResponse>, AppError> {
        let response = self
            .http
            .get(format!(
                "{}/api/v1/files/{}",
                self.base_url,
                urlencoding::encode(user_id)
            ))
            .query(&[("refresh", refresh)])
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("List failed: {}", e)))?;

        let body: FileListResponse = check_response_json(response).await?;
        Ok(body.files)
    }

    /// Delete a job record (not the job itself).
    pub async fn remove(&self, record_id: &str) -> Result<(), AppError> {
        let response = self
            .http
            .delete(format!(
                "{}/api/v1/files/{}",
                self.base_url,
                urlencoding::encode(record_id)
            ))
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Remove failed: {}", e)))?;

        let _: serde_json::Value = check_response_json(response).await?;
        Ok(())
    }

    /// Ask the server whether an encrypted access token is still good.
    pub async fn validate(&self, token: &str) -> Result<ValidateResponse, AppError> {
        let response = self
            .http
            .post(format!("{}/api/v1/auth/google/user", self.base_url))
            .json(&json!({ "token": token }))
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Validate failed: {}", e)))?;

        check_response_json(response).await
    }
}

/// Map the server's `{error, details}` bodies back onto `AppError`.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(format!("JSON parse error: {}", e)));
    }

    let text = response.text().await.unwrap_or_default();
    let details = serde_json::from_str::<ErrorBody>(&text)
        .map(|b| b.details.unwrap_or(b.error))
        .unwrap_or(text);

    Err(match status.as_u16() {
        400 => AppError::BadRequest(details),
        404 => AppError::NotFound(details),
        409 => AppError::DuplicateJob(details),
        _ => AppError::ExternalService(format!("HTTP {}: {}", status, details)),
    })
}
