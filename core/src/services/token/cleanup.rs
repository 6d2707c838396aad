//! Token cleanup service for periodic maintenance of revocation and rotation records
//!
//! Stores with native expiry report nothing to purge; the in-memory and SQL
//! stores rely on this sweep to stay bounded.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::repositories::{RevocationStore, RotationStore};

/// Service for purging expired revocation and rotation records
pub struct TokenCleanupService {
    revocation: Option<Arc<dyn RevocationStore>>,
    rotation: Option<Arc<dyn RotationStore>>,
    interval: Duration,
}

impl TokenCleanupService {
    /// Create a new token cleanup service
    pub fn new(
        revocation: Option<Arc<dyn RevocationStore>>,
        rotation: Option<Arc<dyn RotationStore>>,
        interval: Duration,
    ) -> Self {
        Self {
            revocation,
            rotation,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run a single cleanup cycle
    ///
    /// Failures of one store do not stop the other from being swept; they are
    /// collected in [`CleanupResult::errors`].
    pub async fn run_cleanup(&self) -> CleanupResult {
        debug!("Starting token cleanup cycle");

        let mut result = CleanupResult::default();

        if let Some(store) = &self.revocation {
            match store.purge_expired().await {
                Ok(count) => result.revocations_purged = count,
                Err(e) => {
                    error!("Failed to purge revocation records: {}", e);
                    result.errors.push(format!("Revocation cleanup error: {}", e));
                }
            }
        }

        if let Some(store) = &self.rotation {
            match store.purge_consumed().await {
                Ok(count) => result.rotations_purged = count,
                Err(e) => {
                    error!("Failed to purge rotation records: {}", e);
                    result.errors.push(format!("Rotation cleanup error: {}", e));
                }
            }
        }

        if result.total_cleaned() > 0 {
            info!(
                "Token cleanup completed - Revocations: {}, Rotations: {}",
                result.revocations_purged, result.rotations_purged
            );
        }

        result
    }

    /// Start the cleanup service as a background task
    ///
    /// The task runs a cycle every `interval` until `shutdown` is canceled.
    pub fn start_background_task(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Token cleanup service started - will run every {} seconds",
                self.interval.as_secs()
            );

            let mut interval_timer = tokio::time::interval(self.interval);
            interval_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Token cleanup service stopped");
                        break;
                    }
                    _ = interval_timer.tick() => {
                        let result = self.run_cleanup().await;
                        if !result.is_success() {
                            warn!("Cleanup completed with errors: {:?}", result.errors);
                        }
                    }
                }
            }
        })
    }
}

/// Result of a cleanup operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupResult {
    /// Number of revocation records removed
    pub revocations_purged: usize,
    /// Number of consumed rotation records removed
    pub rotations_purged: usize,
    /// Any errors encountered during cleanup
    pub errors: Vec<String>,
}

impl CleanupResult {
    /// Check if the cleanup was successful (no errors)
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get total number of records cleaned up
    pub fn total_cleaned(&self) -> usize {
        self.revocations_purged + self.rotations_purged
    }
}
