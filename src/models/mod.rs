// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod job;
pub mod user;

pub use job::{JobRecord, JobResponse, JobStatus, JobUpdate, NewJob};
pub use user::{DecryptedUser, User, UserProfile, UserUpsert};
