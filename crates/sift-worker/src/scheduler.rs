//! Periodic knowledge graph rebuilds.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::service::SiftService;

/// Handle for a running scheduler.
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            warn!(error = %e, "Graph scheduler task failed");
        }
    }
}

/// Queue a rebuild for every organization each `period`, starting one period from now.
///
/// Returns `None` when `period` is zero.
pub fn spawn_graph_scheduler(service: SiftService, period: Duration) -> Option<SchedulerHandle> {
    if period.is_zero() {
        info!("Periodic graph rebuilds disabled");
        return None;
    }

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    let task = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_secs = period.as_secs(), "Graph scheduler started");
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = ticker.tick() => {
                    match service.schedule_all_graph_rebuilds().await {
                        Ok(queued) => debug!(queued, "Graph rebuild tick"),
                        Err(e) => warn!(error = %e, "Graph rebuild tick failed"),
                    }
                }
            }
        }
        info!("Graph scheduler stopped");
    });

    Some(SchedulerHandle { shutdown_tx, task })
}
