//! Application state for the API server.

use ferry_core::SessionRegistry;
use ferry_proxy::ForwardingEngine;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Forwarding engine; also owns the session registry and cache.
    pub engine: ForwardingEngine,
}

impl AppState {
    pub fn new(engine: ForwardingEngine) -> Self {
        Self { engine }
    }

    /// The session registry shared with the engine.
    pub fn sessions(&self) -> &SessionRegistry {
        self.engine.sessions()
    }
}
