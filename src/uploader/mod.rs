// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client side of the upload lifecycle: send a CSV to the imputation
//! service, register the job with the backend, poll until it settles.

pub mod backend;
pub mod flow;
pub mod state;

pub use backend::FilesApiClient;
pub use flow::{UploadError, UploadFlow, DEFAULT_POLL_INTERVAL};
pub use state::{TransitionError, UploadEvent, UploadPhase};
