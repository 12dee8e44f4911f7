use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info};

use crate::services::RetentionService;

/// Periodic retention sweep, independent of ingest traffic.
pub struct RetentionScheduler {
    retention: Arc<RetentionService>,
    interval_minutes: u64,
}

impl RetentionScheduler {
    pub fn new(retention: Arc<RetentionService>, interval_minutes: u64) -> Self {
        Self {
            retention,
            interval_minutes,
        }
    }

    /// Runs until `shutdown` flips to true or its sender goes away.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        if self.interval_minutes == 0 {
            info!("Retention sweep disabled");
            return;
        }

        info!("Retention sweep every {}m", self.interval_minutes);

        let mut ticker = interval(Duration::from_secs(self.interval_minutes * 60));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sweep().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Retention sweep stopped");
    }

    async fn sweep(&self) {
        let start = std::time::Instant::now();
        info!(event = "job_started", job_name = "retention_sweep", "Starting retention sweep");

        match self.retention.enforce().await {
            Ok(report) => info!(
                event = "job_finished",
                job_name = "retention_sweep",
                scanned = report.scanned,
                evicted = report.evicted.len(),
                duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Retention sweep finished"
            ),
            Err(e) => {
                error!(event = "job_failed", job_name = "retention_sweep", error = %e, "Retention sweep failed");
            }
        }
    }
}
