// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Impute-Portal API Server
//!
//! Google login, encrypted token storage and imputation job tracking.

use impute_portal::{
    config::{Config, DatabaseBackend},
    db::{FirestoreDb, JobStore, MemoryDb, UserStore},
    services::{GoogleClient, ImputationClient, TokenCipher},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, backend = ?config.database_backend, "Starting Impute-Portal API");

    let (user_store, job_store): (Arc<dyn UserStore>, Arc<dyn JobStore>) =
        match config.database_backend {
            DatabaseBackend::Firestore => {
                let db = FirestoreDb::new(&config.gcp_project_id).await?;
                (Arc::new(db.clone()), Arc::new(db))
            }
            DatabaseBackend::Memory => {
                tracing::warn!("Using in-memory database; data is lost on restart");
                let db = MemoryDb::new();
                (Arc::new(db.clone()), Arc::new(db))
            }
        };

    let cipher = TokenCipher::from_secret(&config.encryption_key)?;
    tracing::info!("Token encryption keys derived");

    let google = GoogleClient::new(
        config.google_client_id.clone(),
        config.google_client_secret.clone(),
        config.google_redirect_uri.clone(),
    )?;

    let imputation = ImputationClient::new(&config.imputation_url, config.imputation_timeout)?;
    tracing::info!(url = %config.imputation_url, "Imputation service client initialized");

    // Build shared state
    let state = Arc::new(AppState::new(
        config.clone(),
        cipher,
        user_store,
        job_store,
        Arc::new(google),
        Arc::new(imputation),
    ));

    // Build router
    let app = impute_portal::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("impute_portal=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
