// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Response;
use dashmap::DashMap;
use impute_portal::config::Config;
use impute_portal::db::{FirestoreDb, MemoryDb};
use impute_portal::error::AppError;
use impute_portal::models::JobStatus;
use impute_portal::routes::create_router;
use impute_portal::services::{
    IdentityProvider, ImputationApi, ProviderProfile, ProviderTokens, TokenCipher,
};
use impute_portal::AppState;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Cipher keyed like `Config::test_default()`, derived once per test binary.
#[allow(dead_code)]
pub fn test_cipher() -> TokenCipher {
    static CIPHER: OnceLock<TokenCipher> = OnceLock::new();
    CIPHER
        .get_or_init(|| {
            TokenCipher::from_secret(&Config::test_default().encryption_key)
                .expect("test cipher")
        })
        .clone()
}

/// Identity provider that hands out queued tokens.
///
/// Every access token it issued resolves to `profile`; `"revoked"` is
/// rejected like an expired token.
pub struct StubIdentity {
    tokens: Mutex<VecDeque<ProviderTokens>>,
    pub profile: ProviderProfile,
}

impl StubIdentity {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(VecDeque::new()),
            profile: ProviderProfile {
                id: "google-1".to_string(),
                email: "a@b.com".to_string(),
                name: Some("A".to_string()),
                picture: Some("url".to_string()),
            },
        }
    }

    #[allow(dead_code)]
    pub fn queue_tokens(&self, access: &str, refresh: Option<&str>) {
        self.tokens.lock().unwrap().push_back(ProviderTokens {
            access_token: access.to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_in: Some(3599),
        });
    }
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://idp.test/o/oauth2/v2/auth?state={}", state)
    }

    async fn exchange_code(&self, _code: &str) -> Result<ProviderTokens, AppError> {
        self.tokens
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| AppError::Identity("invalid_grant".to_string()))
    }

    async fn user_info(&self, access_token: &str) -> Result<ProviderProfile, AppError> {
        if access_token == "revoked" {
            return Err(AppError::Identity(
                AppError::IDENTITY_TOKEN_REJECTED.to_string(),
            ));
        }
        Ok(self.profile.clone())
    }
}

/// Imputation service with settable job statuses. Unknown jobs are 404s.
#[derive(Default)]
pub struct StubImputation {
    statuses: DashMap<String, JobStatus>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl StubImputation {
    pub fn set_status(&self, external_job_id: &str, status: JobStatus) {
        self.statuses.insert(external_job_id.to_string(), status);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImputationApi for StubImputation {
    async fn job_status(&self, external_job_id: &str) -> Result<JobStatus, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.statuses
            .get(external_job_id)
            .map(|s| *s)
            .ok_or_else(|| AppError::ExternalService(AppError::EXTERNAL_JOB_NOT_FOUND.to_string()))
    }
}

/// Router plus handles on its in-memory dependencies.
#[allow(dead_code)]
pub struct TestApp {
    pub router: axum::Router,
    pub state: Arc<AppState>,
    pub db: MemoryDb,
    pub identity: Arc<StubIdentity>,
    pub imputation: Arc<StubImputation>,
}

/// Create a test app backed by the in-memory database and stub services.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    let db = MemoryDb::new();
    let identity = Arc::new(StubIdentity::new());
    let imputation = Arc::new(StubImputation::default());

    let state = Arc::new(AppState::new(
        Config::test_default(),
        test_cipher(),
        Arc::new(db.clone()),
        Arc::new(db.clone()),
        identity.clone(),
        imputation.clone(),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        db,
        identity,
        imputation,
    }
}

/// Read a response body as JSON.
#[allow(dead_code)]
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
