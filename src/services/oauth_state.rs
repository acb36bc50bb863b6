// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Server-side store of OAuth `state` nonces.
//!
//! Each login gets a fresh random nonce. A nonce is accepted on callback
//! at most once and only within its TTL.
//!
//! The login route is unauthenticated, so the store is bounded: expired
//! entries are purged every `PURGE_EVERY` issues (or when full), and once
//! `MAX_PENDING` live nonces exist the oldest is evicted.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use dashmap::DashMap;
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::AppError;

/// How long a login may take between redirect and callback.
pub const STATE_TTL: Duration = Duration::from_secs(10 * 60);

/// Upper bound on nonces awaiting a callback.
pub const MAX_PENDING: usize = 10_000;

/// Expired entries are swept once per this many issued nonces.
const PURGE_EVERY: usize = 256;

const NONCE_LEN: usize = 32;

/// Pending OAuth state nonces, keyed by nonce, valued by expiry.
#[derive(Clone)]
pub struct OAuthStateStore {
    pending: Arc<DashMap<String, Instant>>,
    issued: Arc<AtomicUsize>,
    rng: SystemRandom,
    ttl: Duration,
    max_pending: usize,
}

impl Default for OAuthStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OAuthStateStore {
    pub fn new() -> Self {
        Self::with_ttl(STATE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self::with_limits(ttl, MAX_PENDING)
    }

    pub fn with_limits(ttl: Duration, max_pending: usize) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            issued: Arc::new(AtomicUsize::new(0)),
            rng: SystemRandom::new(),
            ttl,
            max_pending: max_pending.max(1),
        }
    }

    /// Generate and remember a new nonce.
    pub fn issue(&self) -> Result<String, AppError> {
        let now = Instant::now();

        let count = self.issued.fetch_add(1, Ordering::Relaxed);
        if count % PURGE_EVERY == 0 || self.pending.len() >= self.max_pending {
            self.pending.retain(|_, expires| *expires > now);
        }
        while self.pending.len() >= self.max_pending {
            if !self.evict_oldest() {
                break;
            }
        }

        let mut bytes = [0u8; NONCE_LEN];
        self.rng
            .fill(&mut bytes)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("RNG failure")))?;
        let nonce = URL_SAFE_NO_PAD.encode(bytes);

        self.pending.insert(nonce.clone(), now + self.ttl);
        Ok(nonce)
    }

    /// Take a nonce out of the store. True only if it was issued and has not expired.
    pub fn consume(&self, nonce: &str) -> bool {
        match self.pending.remove(nonce) {
            Some((_, expires)) => expires > Instant::now(),
            None => false,
        }
    }

    /// Number of nonces awaiting a callback (including expired, not yet purged).
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn evict_oldest(&self) -> bool {
        let oldest = self
            .pending
            .iter()
            .min_by_key(|entry| *entry.value())
            .map(|entry| entry.key().clone());

        match oldest {
            Some(nonce) => {
                tracing::debug!(
                    pending = self.pending.len(),
                    "OAuth state store full, evicting oldest nonce"
                );
                self.pending.remove(&nonce).is_some()
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issued_nonce_is_single_use() {
        let store = OAuthStateStore::new();
        let nonce = store.issue().unwrap();

        assert!(store.consume(&nonce));
        assert!(!store.consume(&nonce));
    }

    #[test]
    fn test_unknown_nonce_rejected() {
        let store = OAuthStateStore::new();
        assert!(!store.consume("never-issued"));
        assert!(!store.consume(""));
    }

    #[test]
    fn test_nonces_are_unique_and_url_safe() {
        let store = OAuthStateStore::new();
        let a = store.issue().unwrap();
        let b = store.issue().unwrap();

        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_expired_nonce_rejected_and_purged() {
        let store = OAuthStateStore::with_limits(Duration::ZERO, 2);
        let stale = store.issue().unwrap();

        assert!(!store.consume(&stale));

        store.issue().unwrap();
        store.issue().unwrap();
        assert_eq!(store.pending_count(), 2);

        // Full: the expired entries are swept before inserting.
        store.issue().unwrap();
        assert_eq!(store.pending_count(), 1);
    }

    #[test]
    fn test_pending_nonces_are_capped() {
        let store = OAuthStateStore::with_limits(STATE_TTL, 100);
        let first = store.issue().unwrap();

        let mut last = String::new();
        for _ in 0..1_000 {
            last = store.issue().unwrap();
        }

        assert_eq!(store.pending_count(), 100);
        // The oldest nonces were evicted; the newest still works.
        assert!(!store.consume(&first));
        assert!(store.consume(&last));
    }

    #[test]
    fn test_clones_share_pending_nonces() {
        let store = OAuthStateStore::new();
        let handle = store.clone();

        let nonce = store.issue().unwrap();
        assert_eq!(handle.pending_count(), 1);
        assert!(handle.consume(&nonce));
        assert_eq!(store.pending_count(), 0);
    }
}
