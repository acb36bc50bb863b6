//! User model for storage and API.

use serde::{Deserialize, Serialize};
use std::fmt;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// User record stored in the `users` collection.
///
/// Tokens are always `TokenCipher` ciphertext here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Opaque user ID (also used as document ID)
    pub id: String,
    /// Display name from the Google profile
    pub display_name: String,
    /// Email address (unique, natural key)
    pub email: String,
    /// Encrypted Google access token
    pub access_token_encrypted: String,
    /// Encrypted Google refresh token (Google only sends one on first consent)
    pub refresh_token_encrypted: Option<String>,
    /// Profile picture URL
    pub avatar_url: Option<String>,
    /// When the user first logged in
    pub created_at: String,
    /// Last login
    pub updated_at: String,
}

/// Fields written on every login, keyed by email.
#[derive(Debug, Clone)]
pub struct UserUpsert {
    pub email: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub access_token_encrypted: String,
    /// `None` keeps the refresh token already on record.
    pub refresh_token_encrypted: Option<String>,
}

impl UserUpsert {
    /// Build a fresh record for a first login.
    pub fn into_new_user(self, id: String, now: &str) -> User {
        User {
            id,
            display_name: self.display_name,
            email: self.email,
            access_token_encrypted: self.access_token_encrypted,
            refresh_token_encrypted: self.refresh_token_encrypted,
            avatar_url: self.avatar_url,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }

    /// Apply a repeat login on top of the existing record.
    pub fn merge_into(self, existing: &User, now: &str) -> User {
        User {
            id: existing.id.clone(),
            display_name: self.display_name,
            email: existing.email.clone(),
            access_token_encrypted: self.access_token_encrypted,
            refresh_token_encrypted: self
                .refresh_token_encrypted
                .or_else(|| existing.refresh_token_encrypted.clone()),
            avatar_url: self.avatar_url,
            created_at: existing.created_at.clone(),
            updated_at: now.to_string(),
        }
    }
}

/// User with tokens decrypted. Lives only in memory.
#[derive(Clone)]
pub struct DecryptedUser {
    pub id: String,
    pub display_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl fmt::Debug for DecryptedUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Sanitized user projection returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "client/src/lib/generated/")
)]
pub struct UserProfile {
    pub user_id: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub display_name: String,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id.clone(),
            email: user.email.clone(),
            avatar_url: user.avatar_url.clone(),
            display_name: user.display_name.clone(),
        }
    }
}
