//! Sync scheduler - runs sync cycles on a fixed delay until shutdown
//!
//! The [`SyncScheduler`] drives any [`SyncCycle`] (in production the
//! [`SyncEngine`](super::engine::SyncEngine)) in a loop:
//!
//! ```text
//! ┌─→ "Syncing..." ──→ run_cycle() ──→ "Synced! next schedule: <t>"
//! │                         └─error──→ "Sync error! err: (<e>). next schedule: <t>"
//! └──── sleep(delay) ←─┘            (shutdown token cancels the sleep)
//! ```
//!
//! A failed cycle never stops the loop; the next cycle starts after the
//! usual delay. The delay is measured from the end of a cycle, so cycles
//! never overlap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Local;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::engine::{SyncEngine, SyncReport};
use crate::SyncError;

/// Timestamp format used in the "next schedule" log lines
const SCHEDULE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One runnable synchronization cycle
#[async_trait]
pub trait SyncCycle: Send + Sync {
    async fn run_cycle(&self) -> Result<SyncReport, SyncError>;
}

#[async_trait]
impl SyncCycle for SyncEngine {
    async fn run_cycle(&self) -> Result<SyncReport, SyncError> {
        self.sync().await
    }
}

/// Totals reported when the scheduler loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles: u64,
    pub failures: u64,
}

/// Runs a [`SyncCycle`] repeatedly with a fixed delay between cycles
pub struct SyncScheduler {
    cycle: Arc<dyn SyncCycle>,
    delay: Duration,
}

impl SyncScheduler {
    pub fn new(cycle: Arc<dyn SyncCycle>, delay: Duration) -> Self {
        info!(delay_secs = delay.as_secs(), "Creating sync scheduler");
        Self { cycle, delay }
    }

    /// Runs a single cycle, logging its outcome and the next schedule.
    pub async fn run_once(&self) -> Result<SyncReport, SyncError> {
        info!("Syncing...");
        let result = self.cycle.run_cycle().await;
        let next = self.next_schedule();

        match &result {
            Ok(report) => info!(
                created = report.created,
                updated = report.updated,
                deleted = report.deleted,
                passes = report.passes,
                "Synced! next schedule: {next}"
            ),
            Err(err) => error!("Sync error! err: ({err}). next schedule: {next}"),
        }

        result
    }

    /// Loops until `shutdown` is cancelled or `max_cycles` cycles have run.
    ///
    /// A cycle that is running when shutdown is requested completes first;
    /// only the delay between cycles is interrupted.
    pub async fn run(&self, shutdown: CancellationToken, max_cycles: Option<u64>) -> SchedulerStats {
        info!("Sync scheduler starting");
        let mut stats = SchedulerStats::default();

        loop {
            if shutdown.is_cancelled() {
                info!("Shutdown requested before next cycle");
                break;
            }

            stats.cycles += 1;
            if self.run_once().await.is_err() {
                stats.failures += 1;
            }

            if max_cycles.is_some_and(|max| stats.cycles >= max) {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(
            cycles = stats.cycles,
            failures = stats.failures,
            "Sync scheduler stopped"
        );
        stats
    }

    fn next_schedule(&self) -> String {
        let delay = chrono::Duration::from_std(self.delay).unwrap_or(chrono::Duration::zero());
        (Local::now() + delay).format(SCHEDULE_FORMAT).to_string()
    }
}
