// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Impute-Portal: login, file tracking and upload client for a CSV
//! imputation service.
//!
//! The server half provides Google login, user records with tokens
//! encrypted at rest, and job metadata that is reconciled against the
//! external imputation service. The `uploader` module drives the
//! upload/register/poll flow from the client side.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;
pub mod uploader;

use config::Config;
use db::{JobStore, UserStore};
use services::{
    AuthService, IdentityProvider, ImputationApi, JobService, OAuthStateStore, TokenCipher,
    UserService,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub auth: AuthService,
    pub users: UserService,
    pub jobs: JobService,
}

impl AppState {
    /// Wire services from their dependencies.
    pub fn new(
        config: Config,
        cipher: TokenCipher,
        user_store: Arc<dyn UserStore>,
        job_store: Arc<dyn JobStore>,
        identity: Arc<dyn IdentityProvider>,
        imputation: Arc<dyn ImputationApi>,
    ) -> Self {
        let users = UserService::new(user_store, cipher.clone());
        let auth = AuthService::new(identity, users.clone(), OAuthStateStore::new(), cipher);
        let jobs = JobService::new(job_store, imputation);

        Self {
            config,
            auth,
            users,
            jobs,
        }
    }
}
