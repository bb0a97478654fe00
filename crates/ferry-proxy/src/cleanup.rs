//! Periodic sweep of expired sessions and cache entries.
//!
//! Runs on its own interval, independent of request handling, and mutates the
//! same registry and cache the forwarding engine uses.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{debug, info};

use ferry_core::SessionRegistry;

use crate::cache::ResponseCache;

/// Default interval between sweeps.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// What one sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub sessions_removed: usize,
    pub cache_entries_purged: usize,
}

/// The recurring cleanup job.
#[derive(Debug, Clone)]
pub struct CleanupTask {
    sessions: SessionRegistry,
    cache: ResponseCache,
    interval: Duration,
}

impl CleanupTask {
    pub fn new(sessions: SessionRegistry, cache: ResponseCache) -> Self {
        Self {
            sessions,
            cache,
            interval: CLEANUP_INTERVAL,
        }
    }

    /// Overrides the sweep interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs one sweep now.
    pub fn run_once(&self) -> CleanupReport {
        let report = CleanupReport {
            sessions_removed: self.sessions.sweep(),
            cache_entries_purged: self.cache.purge_expired(),
        };
        debug!(
            "Cleanup removed {} sessions and {} cache entries",
            report.sessions_removed, report.cache_entries_purged
        );
        report
    }

    /// Spawns the sweep loop on the current runtime.
    ///
    /// The first sweep happens one interval after start.
    pub fn start(self) -> CleanupHandle {
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel::<()>(1);

        info!("Cleanup task started (every {:?})", self.interval);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(self.interval) => {
                        self.run_once();
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Cleanup task shutdown signal received");
                        break;
                    }
                }
            }
        });

        CleanupHandle {
            shutdown_tx,
            handle,
        }
    }
}

/// Handle to a running cleanup task.
pub struct CleanupHandle {
    shutdown_tx: broadcast::Sender<()>,
    handle: tokio::task::JoinHandle<()>,
}

impl CleanupHandle {
    /// Signals the task to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Waits for the task to finish.
    pub async fn wait(self) {
        let _ = self.handle.await;
    }

    /// Stops the task and waits for it to finish.
    pub async fn stop(self) {
        self.shutdown();
        self.wait().await;
    }
}
