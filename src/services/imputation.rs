// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client for the external imputation service.
//!
//! The service runs the imputation itself; we only submit CSV files,
//! read job status, download results and delete jobs. All endpoints live
//! under `/api/v1/impute`.

use crate::error::AppError;
use crate::models::JobStatus;
use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use serde::Deserialize;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

const API_PREFIX: &str = "/api/v1/impute";
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Source of authoritative job status.
#[async_trait]
pub trait ImputationApi: Send + Sync {
    /// Current status of a job as reported by the imputation service.
    async fn job_status(&self, external_job_id: &str) -> Result<JobStatus, AppError>;
}

/// Response to a file submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmittedJob {
    pub job_id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    status: String,
}

/// HTTP client for the imputation service.
#[derive(Clone)]
pub struct ImputationClient {
    http: reqwest::Client,
    base_url: String,
}

impl ImputationClient {
    /// Create a client. `timeout` bounds each request, including uploads.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn job_url(&self, external_job_id: &str) -> String {
        format!(
            "{}{}/{}",
            self.base_url,
            API_PREFIX,
            urlencoding::encode(external_job_id)
        )
    }

    /// Public download location of a completed job's result.
    pub fn download_url(&self, external_job_id: &str) -> String {
        format!("{}/download", self.job_url(external_job_id))
    }

    /// Submit a CSV file for imputation.
    ///
    /// Upload progress (0.0 to 1.0) is published on `progress` as the body
    /// is streamed out.
    pub async fn upload(
        &self,
        file_name: &str,
        contents: Vec<u8>,
        progress: Option<watch::Sender<f64>>,
    ) -> Result<SubmittedJob, AppError> {
        let total = contents.len() as u64;
        let chunks: Vec<Vec<u8>> = contents
            .chunks(UPLOAD_CHUNK_SIZE)
            .map(<[u8]>::to_vec)
            .collect();

        let mut sent = 0u64;
        let body_stream = stream::iter(chunks).map(move |chunk| {
            sent += chunk.len() as u64;
            if let Some(tx) = &progress {
                let fraction = if total == 0 {
                    1.0
                } else {
                    sent as f64 / total as f64
                };
                tx.send_replace(fraction);
            }
            Ok::<_, std::io::Error>(chunk)
        });

        let part = reqwest::multipart::Part::stream_with_length(
            reqwest::Body::wrap_stream(body_stream),
            total,
        )
        .file_name(file_name.to_string())
        .mime_str("text/csv")
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid MIME type: {}", e)))?;

        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(format!("{}{}/", self.base_url, API_PREFIX))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Upload failed: {}", e)))?;

        let job: SubmittedJob = check_response_json(response).await?;

        tracing::info!(
            job_id = %job.job_id,
            status = %job.status,
            bytes = total,
            "File submitted for imputation"
        );

        Ok(job)
    }

    /// Stream a completed job's result into a local file.
    ///
    /// The body is written to a `.part` file next to `dest` and renamed
    /// over `dest` only once complete. Returns the number of bytes written.
    pub async fn download_to(&self, external_job_id: &str, dest: &Path) -> Result<u64, AppError> {
        let response = self
            .http
            .get(self.download_url(external_job_id))
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Download failed: {}", e)))?;

        let response = check_response(response).await?;

        save_stream(response.bytes_stream(), dest).await
    }

    /// Delete a job and its files on the imputation service.
    pub async fn delete_job(&self, external_job_id: &str) -> Result<(), AppError> {
        let response = self
            .http
            .delete(self.job_url(external_job_id))
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Delete failed: {}", e)))?;

        check_response(response).await?;
        Ok(())
    }
}

#[async_trait]
impl ImputationApi for ImputationClient {
    async fn job_status(&self, external_job_id: &str) -> Result<JobStatus, AppError> {
        let response = self
            .http
            .get(format!("{}/status/", self.job_url(external_job_id)))
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Status request failed: {}", e)))?;

        let body: StatusResponse = check_response_json(response).await?;

        body.status
            .parse()
            .map_err(|e: crate::models::job::UnknownStatus| AppError::ExternalService(e.to_string()))
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if status.as_u16() == 404 {
        return Err(AppError::ExternalService(
            AppError::EXTERNAL_JOB_NOT_FOUND.to_string(),
        ));
    }

    Err(AppError::ExternalService(format!("HTTP {}: {}", status, body)))
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    check_response(response)
        .await?
        .json()
        .await
        .map_err(|e| AppError::ExternalService(format!("JSON parse error: {}", e)))
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(OsString::from).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

/// Write `body` to `dest` via a sibling `.part` file. On any error the
/// partial file is removed and `dest` is left as it was.
async fn save_stream<S, B, E>(body: S, dest: &Path) -> Result<u64, AppError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let partial = partial_path(dest);

    let result = write_stream(body, &partial).await;
    let result = match result {
        Ok(written) => tokio::fs::rename(&partial, dest)
            .await
            .map(|()| written)
            .map_err(|e| {
                AppError::Internal(anyhow::anyhow!("Cannot move {:?} into place: {}", dest, e))
            }),
        Err(e) => Err(e),
    };

    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&partial).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(
                    path = %partial.display(),
                    error = %e,
                    "Could not remove partial download"
                );
            }
        }
    }

    result
}

async fn write_stream<S, B, E>(body: S, path: &Path) -> Result<u64, AppError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: fmt::Display,
{
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Cannot create {:?}: {}", path, e)))?;

    let mut written = 0u64;
    tokio::pin!(body);
    while let Some(chunk) = body.next().await {
        let chunk =
            chunk.map_err(|e| AppError::ExternalService(format!("Download interrupted: {}", e)))?;
        let chunk = chunk.as_ref();
        file.write_all(chunk)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Write failed: {}", e)))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Write failed: {}", e)))?;

    Ok(written)
}
