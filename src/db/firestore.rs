// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Users (profile and encrypted OAuth tokens)
//! - Files (imputation job metadata)
//!
//! Firestore has no unique secondary indexes, so email and external job ID
//! uniqueness is checked with a query before each insert. Two concurrent
//! inserts for the same key can both pass the check.

use crate::db::{collections, new_id, sort_newest_first, JobStore, UserStore};
use crate::error::AppError;
use crate::models::{JobRecord, JobUpdate, NewJob, User, UserUpsert};
use crate::time_utils::now_rfc3339;
use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::FirestoreWritePrecondition;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create an offline client for testing.
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    async fn find_job_by_external_id(
        &self,
        external_job_id: &str,
    ) -> Result<Option<JobRecord>, AppError> {
        let external_job_id = external_job_id.to_string();
        let mut found: Vec<JobRecord> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::FILES)
            .filter(move |q| q.for_all([q.field("external_job_id").eq(external_job_id.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(found.pop())
    }

    /// Overwrite an existing record. Fails with `NotFound` if the document
    /// was deleted since it was read, instead of recreating it.
    async fn write_job(&self, record: &JobRecord) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::FILES)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(&record.id)
            .object(record)
            .execute()
            .await
            .map_err(|e| match e {
                FirestoreError::DataNotFoundError(_) => {
                    AppError::NotFound(format!("File {}", record.id))
                }
                e => AppError::Database(e.to_string()),
            })?;
        Ok(())
    }
}

// ─── User Operations ─────────────────────────────────────────

#[async_trait]
impl UserStore for FirestoreDb {
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let email = email.to_string();
        let mut found: Vec<User> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::USERS)
            .filter(move |q| q.for_all([q.field("email").eq(email.clone())]))
            .limit(1)
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(found.pop())
    }

    async fn upsert_by_email(&self, upsert: UserUpsert) -> Result<User, AppError> {
        let now = now_rfc3339();

        match self.find_by_email(&upsert.email).await? {
            Some(existing) => {
                let user = upsert.merge_into(&existing, &now);
                let _: () = self
                    .get_client()?
                    .fluent()
                    .update()
                    .in_col(collections::USERS)
                    .document_id(&user.id)
                    .object(&user)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                tracing::debug!(user_id = %user.id, "Updated existing user");
                Ok(user)
            }
            None => {
                let user = upsert.into_new_user(new_id(), &now);
                let created: User = self
                    .get_client()?
                    .fluent()
                    .insert()
                    .into(collections::USERS)
                    .document_id(&user.id)
                    .object(&user)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;
                tracing::info!(user_id = %created.id, "Created user");
                Ok(created)
            }
        }
    }
}

// ─── File/Job Operations ─────────────────────────────────────

#[async_trait]
impl JobStore for FirestoreDb {
    async fn insert(&self, job: NewJob) -> Result<JobRecord, AppError> {
        if self
            .find_job_by_external_id(&job.external_job_id)
            .await?
            .is_some()
        {
            return Err(AppError::DuplicateJob(job.external_job_id));
        }

        let record = job.into_record(new_id(), &now_rfc3339());

        let created: JobRecord = self
            .get_client()?
            .fluent()
            .insert()
            .into(collections::FILES)
            .document_id(&record.id)
            .object(&record)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<Option<JobRecord>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::FILES)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<JobRecord>, AppError> {
        let user_id = user_id.to_string();
        // Sorted in memory to avoid requiring a composite index.
        let mut records: Vec<JobRecord> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::FILES)
            .filter(move |q| q.for_all([q.field("user_id").eq(user_id.clone())]))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn update(&self, id: &str, update: JobUpdate) -> Result<JobRecord, AppError> {
        let mut record = self
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {}", id)))?;

        update.apply(&mut record, &now_rfc3339());
        self.write_job(&record).await?;

        Ok(record)
    }

    async fn remove(&self, id: &str) -> Result<(), AppError> {
        // Firestore deletes of missing documents succeed silently.
        if self.get(id).await?.is_none() {
            return Err(AppError::NotFound(format!("File {}", id)));
        }

        self.get_client()?
            .fluent()
            .delete()
            .from(collections::FILES)
            .document_id(id)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        tracing::debug!(file_id = id, "Deleted file record");
        Ok(())
    }
}
