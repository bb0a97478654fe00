//! Session registry.
//!
//! Owns every relay session and is the only place they are created, mutated,
//! or removed.
//!
//! ## Features
//!
//! - Unique opaque session ids with a fresh credential per session
//! - Sliding expiry: each successful validation restarts the 2-hour window
//! - Explicit termination and periodic sweeping of dead sessions
//! - All per-session field updates happen under the registry lock
//!
//! ## Usage
//!
//! ```
//! use ferry_core::session::SessionRegistry;
//!
//! let registry = SessionRegistry::new();
//!
//! let session = registry.create("alice", "10.0.0.7");
//! assert!(registry.validate(&session.id));
//!
//! registry.terminate(&session.id);
//! assert!(registry.get(&session.id).is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::{elapsed_since, Clock, SystemClock};
use crate::crypto;

/// Session timeout duration (2 hours since last successful validation).
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(2 * 60 * 60);

/// Opaque identifier of a relay session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Create a new random session id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a session id from an existing string.
    ///
    /// Used for reconstructing ids from API requests.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One authorized client context.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Credential handed to the client at creation. Not used for wire encryption.
    pub encryption_key: String,
    pub source_address: String,
    pub is_active: bool,
    /// `scheme://host` of the most recently fetched resource.
    pub current_base_url: String,
    pub cookies: HashMap<String, String>,
}

impl Session {
    fn is_expired(&self, clock: &dyn Clock, timeout: Duration) -> bool {
        elapsed_since(clock, self.last_activity) >= timeout
    }

    fn is_dead(&self, clock: &dyn Clock, timeout: Duration) -> bool {
        !self.is_active || self.is_expired(clock, timeout)
    }
}

/// Public view of a live session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub current_base_url: String,
}

/// Manages active sessions with sliding expiry.
///
/// Clones share the same session map.
#[derive(Debug, Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl SessionRegistry {
    /// Create a registry on the system clock with the default timeout.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a registry on the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            clock,
            timeout: SESSION_TIMEOUT,
        }
    }

    /// Overrides the sliding timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the sliding timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Create a new session and return a snapshot of it.
    pub fn create(&self, user_id: &str, source_address: &str) -> Session {
        let now = self.clock.now();
        let mut sessions = self.sessions.write();

        let mut id = SessionId::new();
        while sessions.contains_key(&id) {
            id = SessionId::new();
        }

        let session = Session {
            id: id.clone(),
            user_id: user_id.to_string(),
            created_at: now,
            last_activity: now,
            encryption_key: crypto::generate_key(),
            source_address: source_address.to_string(),
            is_active: true,
            current_base_url: String::new(),
            cookies: HashMap::new(),
        };
        sessions.insert(id, session.clone());
        drop(sessions);

        info!(
            "Session created for user {} from {}",
            user_id, source_address
        );
        session
    }

    /// Validate a session and refresh its activity if valid.
    ///
    /// An expired session is marked inactive and stays inactive; it is
    /// removed by the next [`sweep`](Self::sweep).
    pub fn validate(&self, id: &SessionId) -> bool {
        self.validate_and_get(id).is_some()
    }

    /// Validate a session and return a snapshot of it in one step.
    pub fn validate_and_get(&self, id: &SessionId) -> Option<Session> {
        let mut sessions = self.sessions.write();
        let session = sessions.get_mut(id)?;

        if session.is_dead(self.clock.as_ref(), self.timeout) {
            if session.is_active {
                debug!("Session {} expired", id);
            }
            session.is_active = false;
            return None;
        }

        let now = self.clock.now();
        if now > session.last_activity {
            session.last_activity = now;
        }
        Some(session.clone())
    }

    /// Look up a session without refreshing its activity.
    pub fn get(&self, id: &SessionId) -> Option<Session> {
        self.sessions.read().get(id).cloned()
    }

    /// Status of a session, or `None` when absent or inactive.
    pub fn status(&self, id: &SessionId) -> Option<SessionStatus> {
        let sessions = self.sessions.read();
        let session = sessions.get(id).filter(|s| s.is_active)?;

        Some(SessionStatus {
            session_id: session.id.clone(),
            is_active: session.is_active,
            created_at: session.created_at,
            last_activity: session.last_activity,
            current_base_url: session.current_base_url.clone(),
        })
    }

    /// Remove a session. Unknown ids are ignored.
    pub fn terminate(&self, id: &SessionId) {
        let removed = self.sessions.write().remove(id);
        if removed.is_some() {
            info!("Session terminated: {}", id);
        }
    }

    /// Remove every inactive or expired session and return how many went.
    pub fn sweep(&self) -> usize {
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_dead(self.clock.as_ref(), self.timeout));
        let removed = before - sessions.len();
        drop(sessions);

        info!("Cleaned up {} expired sessions", removed);
        removed
    }

    /// Record the origin of the most recent fetch. Returns false if the session is gone.
    pub fn set_current_base_url(&self, id: &SessionId, base_url: &str) -> bool {
        self.update(id, |session| session.current_base_url = base_url.to_string())
    }

    /// Merge cookies into the session's jar, overwriting same-named entries.
    pub fn merge_cookies<I>(&self, id: &SessionId, cookies: I) -> bool
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.update(id, |session| session.cookies.extend(cookies))
    }

    /// Snapshot of the session's cookie jar.
    pub fn cookies(&self, id: &SessionId) -> Option<HashMap<String, String>> {
        self.sessions.read().get(id).map(|s| s.cookies.clone())
    }

    /// Number of sessions held, live or not yet swept.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the registry holds no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Number of sessions that would currently pass validation.
    pub fn active_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .filter(|s| !s.is_dead(self.clock.as_ref(), self.timeout))
            .count()
    }

    fn update(&self, id: &SessionId, apply: impl FnOnce(&mut Session)) -> bool {
        match self.sessions.write().get_mut(id) {
            Some(session) => {
                apply(session);
                true
            }
            None => false,
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
