// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Upload lifecycle as a pure state machine.
//!
//! ```text
//! Idle -> FileSelected -> Uploading -> UploadFailed
//!                                   -> Registered -> Polling -> Completed
//!                                                            -> Failed
//!                                                            -> Stopped
//! ```
//!
//! Only a job registered as `processing` is polled, and only while it
//! stays `processing`. A job that leaves `processing` without settling
//! (for example back to `pending`) ends in `Stopped`; the backend's
//! refresh picks up its later status.
//!
//! `apply` performs no I/O; `flow` feeds it events.

use std::fmt;

use crate::models::JobStatus;

/// Where an upload currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadPhase {
    Idle,
    FileSelected {
        file_name: String,
        size: u64,
    },
    /// `progress` runs from 0.0 to 1.0.
    Uploading {
        progress: f64,
    },
    UploadFailed {
        error: String,
    },
    /// The imputation service accepted the file. `tracked` is false when
    /// the backend could not record the job; nothing reconciles that later.
    Registered {
        job_id: String,
        status: JobStatus,
        tracked: bool,
    },
    Polling {
        job_id: String,
    },
    Completed {
        job_id: String,
    },
    Failed {
        job_id: String,
        error: Option<String>,
    },
    /// Polling ended because the job left `processing` without settling.
    Stopped {
        job_id: String,
        status: JobStatus,
    },
}

/// Inputs to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    FileSelected { file_name: String, size: u64 },
    UploadStarted,
    Progress(f64),
    UploadFailed(String),
    Registered {
        job_id: String,
        status: JobStatus,
        tracked: bool,
    },
    PollStarted,
    StatusReported(JobStatus),
    PollFailed(String),
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot apply {event} while {phase}")]
pub struct TransitionError {
    pub phase: &'static str,
    pub event: &'static str,
}

impl UploadPhase {
    pub fn name(&self) -> &'static str {
        match self {
            UploadPhase::Idle => "idle",
            UploadPhase::FileSelected { .. } => "file_selected",
            UploadPhase::Uploading { .. } => "uploading",
            UploadPhase::UploadFailed { .. } => "upload_failed",
            UploadPhase::Registered { .. } => "registered",
            UploadPhase::Polling { .. } => "polling",
            UploadPhase::Completed { .. } => "completed",
            UploadPhase::Failed { .. } => "failed",
            UploadPhase::Stopped { .. } => "stopped",
        }
    }

    /// No further events except `Reset` or a new file.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadPhase::UploadFailed { .. }
                | UploadPhase::Completed { .. }
                | UploadPhase::Failed { .. }
                | UploadPhase::Stopped { .. }
        )
    }

    /// Work is in flight; the phase cannot be abandoned.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            UploadPhase::Uploading { .. } | UploadPhase::Polling { .. }
        )
    }

    /// Job ID on the imputation service, once known.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            UploadPhase::Registered { job_id, .. }
            | UploadPhase::Polling { job_id }
            | UploadPhase::Completed { job_id }
            | UploadPhase::Failed { job_id, .. }
            | UploadPhase::Stopped { job_id, .. } => Some(job_id),
            _ => None,
        }
    }

    /// Next phase, or an error if `event` is not legal here.
    pub fn apply(&self, event: UploadEvent) -> Result<UploadPhase, TransitionError> {
        use UploadEvent as E;
        use UploadPhase as P;

        let next = match (self, event) {
            (phase, E::FileSelected { file_name, size }) if !phase.is_busy() => {
                P::FileSelected { file_name, size }
            }
            (P::FileSelected { .. }, E::UploadStarted) => P::Uploading { progress: 0.0 },
            (P::Uploading { .. }, E::Progress(p)) => P::Uploading {
                progress: if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) },
            },
            (P::Uploading { .. }, E::UploadFailed(error)) => P::UploadFailed { error },
            (
                P::Uploading { .. },
                E::Registered {
                    job_id,
                    status,
                    tracked,
                },
            ) => P::Registered {
                job_id,
                status,
                tracked,
            },
            (P::Registered { job_id, status, .. }, E::PollStarted)
                if *status == JobStatus::Processing =>
            {
                P::Polling {
                    job_id: job_id.clone(),
                }
            }
            (P::Registered { job_id, .. } | P::Polling { job_id }, E::StatusReported(status))
                if status.is_terminal() =>
            {
                settle(job_id, status)
            }
            (P::Polling { job_id }, E::StatusReported(JobStatus::Processing)) => P::Polling {
                job_id: job_id.clone(),
            },
            (P::Polling { job_id }, E::StatusReported(status)) => P::Stopped {
                job_id: job_id.clone(),
                status,
            },
            (P::Polling { job_id }, E::PollFailed(error)) => P::Failed {
                job_id: job_id.clone(),
                error: Some(error),
            },
            (phase, E::Reset) if !phase.is_busy() => P::Idle,
            (phase, event) => {
                return Err(TransitionError {
                    phase: phase.name(),
                    event: event.name(),
                })
            }
        };

        Ok(next)
    }
}

fn settle(job_id: &str, status: JobStatus) -> UploadPhase {
    match status {
        JobStatus::Completed => UploadPhase::Completed {
            job_id: job_id.to_string(),
        },
        _ => UploadPhase::Failed {
            job_id: job_id.to_string(),
            error: None,
        },
    }
}

impl UploadEvent {
    pub fn name(&self) -> &'static str {
        match self {
            UploadEvent::FileSelected { .. } => "file_selected",
            UploadEvent::UploadStarted => "upload_started",
            UploadEvent::Progress(_) => "progress",
            UploadEvent::UploadFailed(_) => "upload_failed",
            UploadEvent::Registered { .. } => "registered",
            UploadEvent::PollStarted => "poll_started",
            UploadEvent::StatusReported(_) => "status_reported",
            UploadEvent::PollFailed(_) => "poll_failed",
            UploadEvent::Reset => "reset",
        }
    }
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadPhase::Uploading { progress } => {
                write!(f, "uploading ({:.0}%)", progress * 100.0)
            }
            UploadPhase::Registered {
                job_id,
                status,
                tracked,
            } => {
                write!(f, "registered {} ({})", job_id, status)?;
                if !tracked {
                    f.write_str(" [not tracked]")?;
                }
                Ok(())
            }
            UploadPhase::Polling { job_id } => write!(f, "polling {}", job_id),
            UploadPhase::Completed { job_id } => write!(f, "completed {}", job_id),
            UploadPhase::Failed { job_id, error } => match error {
                Some(e) => write!(f, "failed {}: {}", job_id, e),
                None => write!(f, "failed {}", job_id),
            },
            UploadPhase::Stopped { job_id, status } => {
                write!(f, "stopped watching {} ({})", job_id, status)
            }
            UploadPhase::UploadFailed { error } => write!(f, "upload failed: {}", error),
            other => f.write_str(other.name()),
        }
    }
}
