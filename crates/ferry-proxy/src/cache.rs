//! Per-session response cache.
//!
//! Stores already-rewritten responses keyed by a SHA-256 fingerprint of
//! `session_id:url`, so two sessions never see each other's entries.
//!
//! ## Architecture
//!
//! ```text
//! ForwardingEngine ── get(session, url) ──► fingerprint ──► entry (if not expired)
//!                  └─ put(session, url, response, ttl)
//! CleanupTask ─────── purge_expired()
//! ```
//!
//! Entries expire on an absolute TTL from insertion. Lookups treat expired
//! entries as absent and drop them; the cleanup task purges the rest.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use ferry_core::clock::{elapsed_since, Clock, SystemClock};
use ferry_core::crypto;
use ferry_core::{ProxyResponse, SessionId};

/// A stored response.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub response: ProxyResponse,
    pub inserted_at: DateTime<Utc>,
    pub ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self, clock: &dyn Clock) -> bool {
        elapsed_since(clock, self.inserted_at) >= self.ttl
    }
}

/// Fingerprint of a (session, url) pair.
pub fn fingerprint(session_id: &SessionId, url: &str) -> String {
    crypto::hash(format!("{}:{}", session_id.as_str(), url).as_bytes())
}

/// Shared response cache.
///
/// Clones share the same entries.
#[derive(Clone)]
pub struct ResponseCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("entries", &self.entries.read().len())
            .finish()
    }
}

impl ResponseCache {
    /// Creates an empty cache on the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty cache on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    /// Returns the live entry for `(session_id, url)`, if any.
    pub fn get(&self, session_id: &SessionId, url: &str) -> Option<CacheEntry> {
        let key = fingerprint(session_id, url);

        {
            let entries = self.entries.read();
            match entries.get(&key) {
                Some(entry) if !entry.is_expired(self.clock.as_ref()) => {
                    return Some(entry.clone());
                }
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: drop it unless a fresher put raced in.
        let mut entries = self.entries.write();
        if entries
            .get(&key)
            .is_some_and(|e| e.is_expired(self.clock.as_ref()))
        {
            entries.remove(&key);
        }
        None
    }

    /// Stores a response snapshot for `(session_id, url)`.
    pub fn put(&self, session_id: &SessionId, url: &str, response: ProxyResponse, ttl: Duration) {
        let entry = CacheEntry {
            response,
            inserted_at: self.clock.now(),
            ttl,
        };
        self.entries
            .write()
            .insert(fingerprint(session_id, url), entry);
    }

    /// Removes every expired entry and returns how many went.
    pub fn purge_expired(&self) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(self.clock.as_ref()));
        before - entries.len()
    }

    /// Number of stored entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
