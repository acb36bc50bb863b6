//! Application configuration loaded from environment variables.
//!
//! Secrets are read once at startup and held in memory. They are never
//! printed: the `Debug` impl redacts them.

use std::env;
use std::fmt;
use std::time::Duration;

/// Which persistence backend the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    /// Google Cloud Firestore (or the emulator when `FIRESTORE_EMULATOR_HOST` is set).
    Firestore,
    /// Process-local maps; data is lost on restart.
    Memory,
}

impl std::str::FromStr for DatabaseBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(Self::Firestore),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Invalid("DATABASE_BACKEND", other.to_string())),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Google OAuth client ID (public)
    pub google_client_id: String,
    /// OAuth redirect URI registered with Google (points at our callback route)
    pub google_redirect_uri: String,
    /// Frontend URL for post-login redirects
    pub frontend_url: String,
    /// Base URL of the external imputation service
    pub imputation_url: String,
    /// Per-request timeout for imputation service calls
    pub imputation_timeout: Duration,
    /// GCP project ID (Firestore database)
    pub gcp_project_id: String,
    /// Persistence backend
    pub database_backend: DatabaseBackend,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// Google OAuth client secret
    pub google_client_secret: String,
    /// Secret the token encryption keys are derived from
    pub encryption_key: String,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("google_client_id", &self.google_client_id)
            .field("google_redirect_uri", &self.google_redirect_uri)
            .field("frontend_url", &self.frontend_url)
            .field("imputation_url", &self.imputation_url)
            .field("imputation_timeout", &self.imputation_timeout)
            .field("gcp_project_id", &self.gcp_project_id)
            .field("database_backend", &self.database_backend)
            .field("port", &self.port)
            .field("google_client_secret", &"<redacted>")
            .field("encryption_key", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Config for tests only.
    pub fn test_default() -> Self {
        Self {
            google_client_id: "test_client_id".to_string(),
            google_redirect_uri: "http://localhost:3000/api/v1/auth/google/callback".to_string(),
            frontend_url: "http://localhost:3001".to_string(),
            imputation_url: "http://localhost:8000".to_string(),
            imputation_timeout: Duration::from_secs(5),
            gcp_project_id: "test-project".to_string(),
            database_backend: DatabaseBackend::Memory,
            port: 3000,
            google_client_secret: "test_secret".to_string(),
            encryption_key: "test_encryption_key".to_string(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// A `.env` file in the working directory is honored for local development.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let timeout_secs = match env::var("IMPUTATION_TIMEOUT_SECS") {
            Ok(v) => v
                .trim()
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid("IMPUTATION_TIMEOUT_SECS", v))?,
            Err(_) => 10,
        };

        let database_backend = match env::var("DATABASE_BACKEND") {
            Ok(v) => v.parse()?,
            Err(_) => DatabaseBackend::Firestore,
        };

        Ok(Self {
            google_client_id: required("GOOGLE_CLIENT_ID")?,
            google_redirect_uri: required("GOOGLE_REDIRECT_URI")?,
            frontend_url: env::var("FRONTEND_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:3001".to_string()),
            imputation_url: env::var("IMPUTATION_SERVICE_URL")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            imputation_timeout: Duration::from_secs(timeout_secs),
            gcp_project_id: required("GCP_PROJECT_ID")?,
            database_backend,
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .unwrap_or(3000),

            google_client_secret: required("GOOGLE_CLIENT_SECRET")?,
            encryption_key: required("ENCRYPTION_KEY")?,
        })
    }
}

/// Read a required, non-empty variable (surrounding whitespace trimmed).
fn required(name: &'static str) -> Result<String, ConfigError> {
    let value = env::var(name).map_err(|_| ConfigError::Missing(name))?;
    let value = value.trim().to_string();
    if value.is_empty() {
        return Err(ConfigError::Missing(name));
    }
    Ok(value)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}
