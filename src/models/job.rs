//! File/job metadata linking a user to an external imputation job.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Lifecycle status of an imputation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "client/src/lib/generated/")
)]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed and failed jobs never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for status strings outside the enumeration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status '{0}' (expected pending, processing, completed or failed)")]
pub struct UnknownStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Job record stored in the `files` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Opaque record ID (also used as document ID)
    pub id: String,
    /// Owning user (`users.id`); lookup-only
    pub user_id: String,
    /// Job ID assigned by the imputation service (unique)
    pub external_job_id: String,
    pub status: JobStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for registering a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub user_id: String,
    pub external_job_id: String,
    pub status: JobStatus,
}

impl NewJob {
    pub fn into_record(self, id: String, now: &str) -> JobRecord {
        JobRecord {
            id,
            user_id: self.user_id,
            external_job_id: self.external_job_id,
            status: self.status,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
}

impl JobUpdate {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
        }
    }

    /// Apply to a record, bumping `updated_at`.
    pub fn apply(&self, record: &mut JobRecord, now: &str) {
        if let Some(status) = self.status {
            record.status = status;
        }
        record.updated_at = now.to_string();
    }
}

/// Job record as returned by the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "client/src/lib/generated/")
)]
pub struct JobResponse {
    pub id: String,
    pub user_id: String,
    pub external_job_id: String,
    pub status: JobStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl From<JobRecord> for JobResponse {
    fn from(record: JobRecord) -> Self {
        Self {
            id: record.id,
            user_id: record.user_id,
            external_job_id: record.external_job_id,
            status: record.status,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}
