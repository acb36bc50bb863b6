//! Database layer (Firestore, plus an in-process backend).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{JobRecord, JobUpdate, NewJob, User, UserUpsert};
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// File/job metadata records
    pub const FILES: &str = "files";
}

/// Persistence for user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Get a user by opaque ID.
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;

    /// Get a user by email (the natural key).
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Insert a new user or update the one with the same email.
    ///
    /// An existing record keeps its `id` and `created_at`.
    async fn upsert_by_email(&self, upsert: UserUpsert) -> Result<User, AppError>;
}

/// Persistence for file/job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a record. Fails with `DuplicateJob` if the external job ID is taken.
    async fn insert(&self, job: NewJob) -> Result<JobRecord, AppError>;

    /// Get a record by ID.
    async fn get(&self, id: &str) -> Result<Option<JobRecord>, AppError>;

    /// All records owned by a user, newest first.
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<JobRecord>, AppError>;

    /// Partially update a record. Fails with `NotFound` if absent.
    async fn update(&self, id: &str, update: JobUpdate) -> Result<JobRecord, AppError>;

    /// Delete a record. Fails with `NotFound` if absent.
    async fn remove(&self, id: &str) -> Result<(), AppError>;
}

/// Newest first; ties broken by ID so ordering is stable across backends.
pub(crate) fn sort_newest_first(records: &mut [JobRecord]) {
    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
