use crate::ranking::RankingComputer;
use crate::traits::RenderSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Decides when the leaderboard is recomputed and handed to the render sink.
pub struct RefreshScheduler {
    ranking: RankingComputer,
    sink: Arc<dyn RenderSink>,
    batch_size: u64,
    refreshes: AtomicU64,
}

impl RefreshScheduler {
    pub fn new(ranking: RankingComputer, sink: Arc<dyn RenderSink>, batch_size: u64) -> Self {
        Self {
            ranking,
            sink,
            batch_size: batch_size.max(1),
            refreshes: AtomicU64::new(0),
        }
    }

    /// Number of completed recomputations so far.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }

    fn is_due(&self, total_saved: u64) -> bool {
        total_saved != 0 && total_saved % self.batch_size == 0
    }

    /// Refresh when `total_saved` lands on a batch boundary. Returns whether a
    /// refresh was attempted.
    pub async fn maybe_refresh(&self, total_saved: u64) -> bool {
        if !self.is_due(total_saved) {
            return false;
        }
        info!("{} ratings saved, refreshing leaderboard", total_saved);
        self.refresh().await;
        true
    }

    /// Same cadence as `maybe_refresh`, but the refresh runs on its own task
    /// and the caller goes straight back to merging.
    pub fn spawn_refresh_if_due(self: &Arc<Self>, total_saved: u64) -> Option<JoinHandle<()>> {
        if !self.is_due(total_saved) {
            return None;
        }
        info!("{} ratings saved, refreshing leaderboard in the background", total_saved);
        let scheduler = Arc::clone(self);
        Some(tokio::spawn(async move { scheduler.refresh().await }))
    }

    /// Recompute and render unconditionally. A store failure is logged and the
    /// refresh abandoned.
    pub async fn refresh(&self) {
        match self.ranking.compute_ranking().await {
            Ok(entries) => {
                self.refreshes.fetch_add(1, Ordering::SeqCst);
                self.sink.render(&entries);
            }
            Err(e) => error!("Failed to compute leaderboard: {}", e),
        }
    }
}
