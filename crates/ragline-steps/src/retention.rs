use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::store::StepStore;

/// Periodically removes completed jobs older than `retention` from a step store.
pub struct RetentionSweeper {
    store: Arc<dyn StepStore>,
    retention: Duration,
    every: Duration,
    shutdown_rx: watch::Receiver<bool>,
}

impl RetentionSweeper {
    #[must_use]
    pub fn new(
        store: Arc<dyn StepStore>,
        retention: Duration,
        every: Duration,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            retention,
            every,
            shutdown_rx,
        }
    }

    /// Sweep on every interval tick until shutdown is signalled.
    pub async fn run(&mut self) {
        let mut interval = tokio::time::interval(self.every.max(Duration::from_millis(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep().await;
                }
                _ = self.shutdown_rx.changed() => {
                    if *self.shutdown_rx.borrow() {
                        tracing::info!("step retention sweeper shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// One pass. Returns the number of purged jobs; errors are logged, not raised.
    pub async fn sweep(&self) -> u64 {
        let Ok(retention) = chrono::Duration::from_std(self.retention) else {
            tracing::warn!("step retention period out of range, skipping sweep");
            return 0;
        };
        let cutoff = chrono::Utc::now() - retention;
        match self.store.purge_completed_before(cutoff).await {
            Ok(0) => 0,
            Ok(purged) => {
                tracing::info!(purged, "purged completed jobs past retention");
                purged
            }
            Err(e) => {
                tracing::warn!("step retention sweep failed: {e}");
                0
            }
        }
    }
}
