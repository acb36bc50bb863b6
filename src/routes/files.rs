// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! File/job metadata routes.
//!
//! `GET /api/v1/files/{userId}` is not a pure read: unless called with
//! `?refresh=false` it reconciles every record against the imputation
//! service first.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::error::{AppError, Result};
use crate::models::job::UnknownStatus;
use crate::models::{JobResponse, JobStatus, JobUpdate};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/files", post(create_file))
        .route(
            "/api/v1/files/{id}",
            get(list_files).patch(update_file).delete(delete_file),
        )
}

fn parse_status(raw: Option<&str>) -> Result<Option<JobStatus>> {
    raw.map(|s| {
        s.parse()
            .map_err(|e: UnknownStatus| AppError::BadRequest(e.to_string()))
    })
    .transpose()
}

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
}

fn check<T: Validate>(value: &T) -> Result<()> {
    value
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))
}

// ─── Create ──────────────────────────────────────────────────

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileRequest {
    #[validate(length(min = 1, max = 256))]
    pub user_id: String,
    #[serde(alias = "bEfileId", alias = "beFileId")]
    #[validate(length(min = 1, max = 256))]
    pub external_job_id: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "client/src/lib/generated/")
)]
pub struct FileResponse {
    pub success: bool,
    pub file: JobResponse,
}

/// Register a job that was started on the imputation service.
async fn create_file(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<CreateFileRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<FileResponse>)> {
    let req = json_body(body)?;
    check(&req)?;
    let status = parse_status(req.status.as_deref())?;

    let record = state
        .jobs
        .create(&req.user_id, &req.external_job_id, status)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(FileResponse {
            success: true,
            file: record.into(),
        }),
    ))
}

// ─── List ────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ListQuery {
    #[serde(default = "default_refresh")]
    refresh: bool,
}

fn default_refresh() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "client/src/lib/generated/")
)]
pub struct FileListResponse {
    pub success: bool,
    pub files: Vec<JobResponse>,
}

/// List a user's files, newest first.
async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<FileListResponse>> {
    let records = if query.refresh {
        state.jobs.refresh_for_user(&user_id).await?.jobs
    } else {
        state.jobs.list_by_user(&user_id).await?
    };

    Ok(Json(FileListResponse {
        success: true,
        files: records.into_iter().map(JobResponse::from).collect(),
    }))
}

// ─── Update / Delete ─────────────────────────────────────────

#[derive(Deserialize)]
pub struct UpdateFileRequest {
    #[serde(default)]
    pub status: Option<String>,
}

async fn update_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: std::result::Result<Json<UpdateFileRequest>, JsonRejection>,
) -> Result<Json<FileResponse>> {
    let req = json_body(body)?;
    let update = JobUpdate {
        status: parse_status(req.status.as_deref())?,
    };

    let record = state.jobs.update(&id, update).await?;

    Ok(Json(FileResponse {
        success: true,
        file: record.into(),
    }))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteFileResponse {
    pub success: bool,
    pub message: String,
}

async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeleteFileResponse>> {
    state.jobs.remove(&id).await?;

    Ok(Json(DeleteFileResponse {
        success: true,
        message: "File deleted successfully".to_string(),
    }))
}
