// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Async driver for the upload lifecycle.
//!
//! The file goes straight to the imputation service; the backend only
//! learns the resulting job ID. Phase changes are published on a `watch`
//! channel so callers can render progress.

use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::models::JobStatus;
use crate::services::imputation::{ImputationApi, ImputationClient, SubmittedJob};
use crate::uploader::backend::FilesApiClient;
use crate::uploader::state::{TransitionError, UploadEvent, UploadPhase};

/// Delay between status checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Service(#[from] AppError),
}

/// Drives one upload at a time for a user.
pub struct UploadFlow {
    imputation: ImputationClient,
    backend: FilesApiClient,
    user_id: String,
    poll_interval: Duration,
    phase: watch::Sender<UploadPhase>,
}

impl UploadFlow {
    pub fn new(imputation: ImputationClient, backend: FilesApiClient, user_id: &str) -> Self {
        Self {
            imputation,
            backend,
            user_id: user_id.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            phase: watch::channel(UploadPhase::Idle).0,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Follow phase changes.
    pub fn subscribe(&self) -> watch::Receiver<UploadPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> UploadPhase {
        self.phase.borrow().clone()
    }

    fn apply(&self, event: UploadEvent) -> Result<UploadPhase, TransitionError> {
        let next = self.phase.borrow().apply(event)?;
        if !matches!(next, UploadPhase::Uploading { .. }) {
            tracing::debug!(phase = next.name(), "Upload phase changed");
        }
        self.phase.send_replace(next.clone());
        Ok(next)
    }

    /// Upload a file, register it, and poll until it settles or `cancel` fires.
    pub async fn run(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<UploadPhase, UploadError> {
        let contents = tokio::fs::read(path).await.map_err(|source| UploadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload.csv".to_string());

        let Some(job) = self.upload(&file_name, contents).await? else {
            return Ok(self.phase());
        };

        self.register(&job).await?;
        match job.status {
            JobStatus::Processing => self.poll(&job.job_id, cancel).await,
            status if status.is_terminal() => {
                Ok(self.apply(UploadEvent::StatusReported(status))?)
            }
            // Queued but not started: nothing to watch yet.
            _ => Ok(self.phase()),
        }
    }

    /// Select `contents` as `file_name` and send it. `None` means the
    /// upload failed and the phase records why.
    pub async fn upload(
        &self,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<Option<SubmittedJob>, UploadError> {
        self.apply(UploadEvent::FileSelected {
            file_name: file_name.to_string(),
            size: contents.len() as u64,
        })?;
        self.apply(UploadEvent::UploadStarted)?;

        let (progress_tx, mut progress_rx) = watch::channel(0.0);
        let upload = self.imputation.upload(file_name, contents, Some(progress_tx));
        tokio::pin!(upload);

        let result = loop {
            tokio::select! {
                res = &mut upload => break res,
                changed = progress_rx.changed() => match changed {
                    Ok(()) => {
                        let progress = *progress_rx.borrow_and_update();
                        self.apply(UploadEvent::Progress(progress))?;
                    }
                    // Body fully handed to the transport.
                    Err(_) => break (&mut upload).await,
                },
            }
        };

        match result {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                tracing::warn!(error = %e, file_name, "Upload failed");
                self.apply(UploadEvent::UploadFailed(e.to_string()))?;
                Ok(None)
            }
        }
    }

    /// Record the job with the backend. A failure here is logged and the
    /// job stays untracked.
    pub async fn register(&self, job: &SubmittedJob) -> Result<UploadPhase, UploadError> {
        let tracked = match self
            .backend
            .register(&self.user_id, &job.job_id, job.status)
            .await
        {
            Ok(record) => {
                tracing::info!(record_id = %record.id, job_id = %job.job_id, "Job registered");
                true
            }
            Err(e) => {
                tracing::error!(
                    job_id = %job.job_id,
                    error = %e,
                    "Job registration failed; job exists on the imputation service but is not tracked"
                );
                false
            }
        };

        Ok(self.apply(UploadEvent::Registered {
            job_id: job.job_id.clone(),
            status: job.status,
            tracked,
        })?)
    }

    /// Poll job status while it reports `processing`. Stops when the job
    /// settles, leaves `processing` any other way, a check fails, or
    /// `cancel` fires.
    ///
    /// Cancelling leaves the phase at `Polling`.
    pub async fn poll(
        &self,
        job_id: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadPhase, UploadError> {
        self.apply(UploadEvent::PollStarted)?;

        loop {
            let status = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(job_id, "Polling cancelled");
                    return Ok(self.phase());
                }
                status = self.check_after_delay(job_id) => status,
            };

            let phase = match status {
                Ok(status) => self.apply(UploadEvent::StatusReported(status))?,
                Err(e) => {
                    tracing::warn!(job_id, error = %e, "Status check failed");
                    self.apply(UploadEvent::PollFailed(e.to_string()))?
                }
            };

            if phase.is_terminal() {
                return Ok(phase);
            }
        }
    }

    async fn check_after_delay(&self, job_id: &str) -> Result<JobStatus, AppError> {
        tokio::time::sleep(self.poll_interval).await;
        self.imputation.job_status(job_id).await
    }

    /// Save a completed job's result to `dest`.
    pub async fn download(&self, job_id: &str, dest: &Path) -> Result<u64, UploadError> {
        let bytes = self.imputation.download_to(job_id, dest).await?;
        tracing::info!(job_id, bytes, dest = %dest.display(), "Downloaded result");
        Ok(bytes)
    }

    /// Delete a job on the imputation service (best effort), then its
    /// backend record if there is one.
    pub async fn discard(&self, job_id: &str, record_id: Option<&str>) -> Result<(), UploadError> {
        if let Err(e) = self.imputation.delete_job(job_id).await {
            tracing::warn!(job_id, error = %e, "Could not delete job on imputation service");
        }

        if let Some(record_id) = record_id {
            self.backend.remove(record_id).await?;
        }

        let current = self.phase();
        if current.job_id() == Some(job_id) && !current.is_busy() {
            self.apply(UploadEvent::Reset)?;
        }
        Ok(())
    }
}
