// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! File/job metadata and status reconciliation.
//!
//! `list_by_user` is a plain read. `refresh_for_user` asks the
//! imputation service for the status of every record, persists what
//! changed, and returns all records. A record whose check fails keeps
//! its stored status.

use futures_util::{stream, StreamExt};
use std::sync::Arc;

use crate::db::JobStore;
use crate::error::AppError;
use crate::models::{JobRecord, JobStatus, JobUpdate, NewJob};
use crate::services::imputation::ImputationApi;

/// Upper bound on concurrent status requests per refresh.
pub const MAX_CONCURRENT_STATUS_CHECKS: usize = 8;

/// Outcome of a refresh.
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    /// Every record for the user, newest first.
    pub jobs: Vec<JobRecord>,
    /// Records whose status changed and was persisted.
    pub updated: usize,
    /// Records whose check or write failed.
    pub failed: usize,
}

enum Reconciled {
    Unchanged(JobRecord),
    Updated(JobRecord),
    Failed(JobRecord),
}

/// Job metadata operations.
#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    imputation: Arc<dyn ImputationApi>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, imputation: Arc<dyn ImputationApi>) -> Self {
        Self { store, imputation }
    }

    /// Register a job started on the imputation service.
    pub async fn create(
        &self,
        user_id: &str,
        external_job_id: &str,
        status: Option<JobStatus>,
    ) -> Result<JobRecord, AppError> {
        let record = self
            .store
            .insert(NewJob {
                user_id: user_id.to_string(),
                external_job_id: external_job_id.to_string(),
                status: status.unwrap_or(JobStatus::Pending),
            })
            .await?;

        tracing::info!(
            file_id = %record.id,
            user_id = %record.user_id,
            external_job_id = %record.external_job_id,
            status = %record.status,
            "Registered job"
        );

        Ok(record)
    }

    /// Stored records for a user, newest first. No external calls.
    pub async fn list_by_user(&self, user_id: &str) -> Result<Vec<JobRecord>, AppError> {
        self.store.list_by_user(user_id).await
    }

    /// Reconcile a user's records against the imputation service.
    pub async fn refresh_for_user(&self, user_id: &str) -> Result<RefreshReport, AppError> {
        let records = self.store.list_by_user(user_id).await?;
        if records.is_empty() {
            return Ok(RefreshReport::default());
        }

        let results: Vec<Reconciled> = stream::iter(records)
            .map(|record| self.reconcile(record))
            .buffered(MAX_CONCURRENT_STATUS_CHECKS)
            .collect()
            .await;

        let mut report = RefreshReport::default();
        for result in results {
            let record = match result {
                Reconciled::Unchanged(r) => r,
                Reconciled::Updated(r) => {
                    report.updated += 1;
                    r
                }
                Reconciled::Failed(r) => {
                    report.failed += 1;
                    r
                }
            };
            report.jobs.push(record);
        }

        tracing::debug!(
            user_id,
            total = report.jobs.len(),
            updated = report.updated,
            failed = report.failed,
            "Refreshed job statuses"
        );

        Ok(report)
    }

    async fn reconcile(&self, record: JobRecord) -> Reconciled {
        let status = match self.imputation.job_status(&record.external_job_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(
                    file_id = %record.id,
                    external_job_id = %record.external_job_id,
                    error = %e,
                    "Status check failed, keeping stored status"
                );
                return Reconciled::Failed(record);
            }
        };

        if status == record.status {
            return Reconciled::Unchanged(record);
        }

        match self
            .store
            .update(&record.id, JobUpdate::status(status))
            .await
        {
            Ok(updated) => {
                tracing::info!(
                    file_id = %updated.id,
                    from = %record.status,
                    to = %updated.status,
                    "Job status changed"
                );
                Reconciled::Updated(updated)
            }
            Err(e) => {
                tracing::warn!(
                    file_id = %record.id,
                    error = %e,
                    "Failed to persist refreshed status"
                );
                Reconciled::Failed(record)
            }
        }
    }

    /// Apply a partial update.
    pub async fn update(&self, id: &str, update: JobUpdate) -> Result<JobRecord, AppError> {
        self.store.update(id, update).await
    }

    /// Delete a record. The job on the imputation service is left alone.
    pub async fn remove(&self, id: &str) -> Result<(), AppError> {
        self.store.remove(id).await?;
        tracing::info!(file_id = id, "Removed job record");
        Ok(())
    }
}
