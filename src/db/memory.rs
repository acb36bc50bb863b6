// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process database backend.
//!
//! Used for local development (`DATABASE_BACKEND=memory`) and tests.
//! Uniqueness of email and external job ID is enforced atomically through
//! `DashMap` entry locks on the secondary indexes.

use crate::db::{new_id, sort_newest_first, JobStore, UserStore};
use crate::error::AppError;
use crate::models::{JobRecord, JobUpdate, NewJob, User, UserUpsert};
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// In-memory store for users and job records.
#[derive(Clone, Default)]
pub struct MemoryDb {
    users: Arc<DashMap<String, User>>,
    /// email -> user ID
    user_ids_by_email: Arc<DashMap<String, String>>,
    jobs: Arc<DashMap<String, JobRecord>>,
    /// external job ID -> record ID
    job_ids_by_external: Arc<DashMap<String, String>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[async_trait]
impl UserStore for MemoryDb {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let Some(id) = self.user_ids_by_email.get(email).map(|id| id.clone()) else {
            return Ok(None);
        };
        self.find_by_id(&id).await
    }

    async fn upsert_by_email(&self, upsert: UserUpsert) -> Result<User, AppError> {
        let now = now_rfc3339();

        // The email entry stays locked until the user map is written.
        match self.user_ids_by_email.entry(upsert.email.clone()) {
            Entry::Occupied(entry) => {
                let id = entry.get().clone();
                let existing = self
                    .users
                    .get(&id)
                    .map(|u| u.clone())
                    .ok_or_else(|| AppError::Database(format!("Dangling email index for {}", id)))?;
                let user = upsert.merge_into(&existing, &now);
                self.users.insert(id, user.clone());
                Ok(user)
            }
            Entry::Vacant(entry) => {
                let user = upsert.into_new_user(new_id(), &now);
                self.users.insert(user.id.clone(), user.clone());
                entry.insert(user.id.clone());
                Ok(user)
            }
        }
    }
}

#[async_trait]
impl JobStore for MemoryDb {
    async fn insert(&self, job: NewJob) -> Result<JobRecord, AppError> {
        match self.job_ids_by_external.entry(job.external_job_id.clone()) {
            Entry::Occupied(_) => Err(AppError::DuplicateJob(job.external_job_id)),
            Entry::Vacant(entry) => {
                let record = job.into_record(new_id(), &now_rfc3339());
                self.jobs.insert(record.id.clone(), record.clone());
                entry.insert(record.id.clone());
                Ok(record)
            }
        }
    }

    async fn get(&self, id: &str) -> Result<Option<JobRecord>, AppError> {
        Ok(self.jobs.get(id).map(|r| r.clone()))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<JobRecord>, AppError> {
        let mut records: Vec<JobRecord> = self
            .jobs
            .iter()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.clone())
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn update(&self, id: &str, update: JobUpdate) -> Result<JobRecord, AppError> {
        let mut record = self
            .jobs
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(format!("File {}", id)))?;
        update.apply(&mut record, &now_rfc3339());
        Ok(record.clone())
    }

    async fn remove(&self, id: &str) -> Result<(), AppError> {
        let (_, record) = self
            .jobs
            .remove(id)
            .ok_or_else(|| AppError::NotFound(format!("File {}", id)))?;
        self.job_ids_by_external.remove(&record.external_job_id);
        Ok(())
    }
}
