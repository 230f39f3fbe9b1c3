//! Expired grant sweep.
//!
//! Background task that deletes grants past expiry plus a grace period and
//! prunes stale external-login states. The delete predicate only selects
//! rows already expired, so it can never take a grant that is still
//! redeemable. Failures are logged and the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use super::repository::GrantStore;
use crate::idp::PendingAuthorizations;

/// Batches deleted per tick before yielding to the next interval
const MAX_BATCHES_PER_RUN: usize = 20;

#[derive(Debug, Clone)]
pub struct CleanupConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// How long past expiry a grant is kept
    pub grace_period: Duration,
    pub batch_size: usize,
    pub store_timeout: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(3600),
            grace_period: Duration::from_secs(300),
            batch_size: 500,
            store_timeout: Duration::from_secs(5),
        }
    }
}

pub struct GrantCleanupTask {
    grants: Arc<dyn GrantStore>,
    pending: Option<Arc<PendingAuthorizations>>,
    config: CleanupConfig,
}

impl GrantCleanupTask {
    pub fn new(grants: Arc<dyn GrantStore>, config: CleanupConfig) -> Self {
        Self {
            grants,
            pending: None,
            config,
        }
    }

    pub fn with_pending(mut self, pending: Arc<PendingAuthorizations>) -> Self {
        self.pending = Some(pending);
        self
    }

    /// Run until `shutdown` flips to true.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            info!("Grant cleanup task is disabled");
            return;
        }

        info!(
            interval_secs = self.config.interval.as_secs(),
            grace_secs = self.config.grace_period.as_secs(),
            batch_size = self.config.batch_size,
            "Starting grant cleanup task"
        );

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Grant cleanup task stopping");
                        return;
                    }
                }
            }
        }
    }

    /// One sweep. Returns the number of grants removed.
    pub async fn run_once(&self) -> u64 {
        if let Some(pending) = &self.pending {
            let pruned = pending.prune_expired();
            if pruned > 0 {
                debug!(pruned, "Pruned stale external login states");
            }
        }

        let grace = chrono::Duration::from_std(self.config.grace_period).unwrap_or_else(|_| chrono::Duration::zero());
        let cutoff = Utc::now() - grace;
        let mut total = 0u64;

        for _ in 0..MAX_BATCHES_PER_RUN {
            let batch = tokio::time::timeout(
                self.config.store_timeout,
                self.grants.remove_expired(cutoff, self.config.batch_size),
            )
            .await;

            match batch {
                Ok(Ok(removed)) => {
                    total += removed;
                    if (removed as usize) < self.config.batch_size {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Grant cleanup batch failed");
                    break;
                }
                Err(_) => {
                    error!("Grant cleanup batch timed out");
                    break;
                }
            }
        }

        if total > 0 {
            info!(removed = total, "Removed expired grants");
        } else {
            debug!("No expired grants to remove");
        }
        total
    }
}
