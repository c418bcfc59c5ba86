//! Periodic attribution ledger cleanup.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use insights_attribution::AttributionTracker;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Owns the background cleanup task; dropping it stops the task.
pub struct MaintenanceHandle {
    task: JoinHandle<()>,
}

impl MaintenanceHandle {
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawn a task that prunes expired touchpoints every `every`.
/// Must be called from within a tokio runtime.
pub fn spawn_ledger_cleanup(
    tracker: Arc<Mutex<AttributionTracker>>,
    every: Duration,
) -> MaintenanceHandle {
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let removed = tracker.lock().prune(Utc::now());
            if removed > 0 {
                metrics::counter!("attribution.touchpoints_pruned").increment(removed as u64);
                info!(removed, "ledger cleanup pruned expired touchpoints");
            } else {
                debug!("ledger cleanup found nothing to prune");
            }
        }
    });
    MaintenanceHandle { task }
}
