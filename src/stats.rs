use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::store::LeadRepository;

/// Quiet window after the last write before the aggregate is recomputed.
pub const STATS_DEBOUNCE_WINDOW: Duration = Duration::from_secs(60);

/// Write-side handle to the stats worker. Signals are lossy by design: a
/// burst of writes collapses into one pending recompute.
#[derive(Clone)]
pub struct StatsHandle {
    tx: mpsc::Sender<()>,
}

impl StatsHandle {
    pub fn signal(&self) {
        // A full channel means a recompute is already pending
        let _ = self.tx.try_send(());
    }
}

/// Spawns the trailing-edge debounced stats recomputation worker.
///
/// The worker waits until `window` has elapsed with no further signals, so
/// the recomputed aggregate reflects the latest burst of writes rather than
/// the first one. The window is injectable so tests can drive it with a
/// paused clock.
pub fn spawn_stats_worker(repo: Arc<dyn LeadRepository>, window: Duration) -> StatsHandle {
    let (tx, mut rx) = mpsc::channel::<()>(8);

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            // Trailing edge: every new signal restarts the quiet window
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(window) => break,
                    more = rx.recv() => {
                        if more.is_none() {
                            break;
                        }
                    }
                }
            }

            match repo.compute_stats().await {
                Ok(stats) => {
                    if let Err(e) = repo.save_stats(&stats).await {
                        tracing::warn!("Failed to save recomputed lead stats: {}", e);
                    } else {
                        tracing::debug!(
                            "Lead stats recomputed: {} total leads",
                            stats.total_leads
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!("Lead stats recomputation failed: {}", e);
                }
            }
        }
    });

    StatsHandle { tx }
}
