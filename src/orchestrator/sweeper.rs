//! Background maintenance: promote delayed jobs, reclaim silent dispatches and
//! flush breaker state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::orchestrator::engine::Orchestrator;

/// What one sweep did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub promoted: usize,
    pub reclaimed: usize,
}

/// Run one maintenance pass.
pub async fn sweep(orchestrator: &Orchestrator) -> SweepReport {
    let now = Utc::now();
    let report = SweepReport {
        promoted: orchestrator.queue().promote_due(now),
        reclaimed: orchestrator.reclaim_expired_leases(now).await,
    };
    orchestrator.persist_breakers().await;
    if report != SweepReport::default() {
        tracing::debug!(promoted = report.promoted, reclaimed = report.reclaimed, "Sweep");
    }
    report
}

/// Periodic `sweep` on a background task.
pub struct Sweeper {
    handle: JoinHandle<()>,
    shutdown_tx: mpsc::Sender<()>,
}

impl Sweeper {
    pub fn spawn(orchestrator: Arc<Orchestrator>, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep(&orchestrator).await;
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::debug!("Sweeper stopped");
        });
        Self { handle, shutdown_tx }
    }

    /// Stop the loop and wait for an in-flight sweep to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Sweeper task failed");
        }
    }
}
