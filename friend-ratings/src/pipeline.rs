use crate::aggregator::RatingAggregator;
use crate::collector::SourceCollector;
use crate::ranking::RankingComputer;
use crate::scheduler::RefreshScheduler;
use crate::traits::{KeyValueStore, PageSource, RenderSink};
use crate::types::{RunConfig, RunState, RunSummary, SubjectType};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Drives every friend's collector to completion and feeds the aggregator.
///
/// A friend whose feed fails is logged and skipped; the rest of the run goes
/// on. Counters live in a fresh `RunState` per run while the store is reused
/// as-is, so repeated runs keep adding to what earlier runs persisted.
pub struct RatingsPipeline {
    collector: SourceCollector,
    aggregator: RatingAggregator,
    scheduler: Arc<RefreshScheduler>,
    config: RunConfig,
}

impl RatingsPipeline {
    pub fn new(
        source: Arc<dyn PageSource>,
        store: Arc<dyn KeyValueStore>,
        sink: Arc<dyn RenderSink>,
        page_limit: u32,
        config: RunConfig,
    ) -> Self {
        let ranking = RankingComputer::new(store.clone());
        Self {
            collector: SourceCollector::new(source, page_limit),
            aggregator: RatingAggregator::new(store),
            scheduler: Arc::new(RefreshScheduler::new(ranking, sink, config.batch_size)),
            config,
        }
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.scheduler
    }

    /// Render whatever is already persisted. Called once at startup.
    pub async fn refresh(&self) {
        self.scheduler.refresh().await;
    }

    pub async fn run(&self, source_ids: &[String], subject_type: SubjectType) -> RunSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let state = RunState::new();
        let batch_refreshes = Mutex::new(Vec::new());
        let sources_total = source_ids.len();

        info!(
            "Run {}: collecting {} collections from {} friends",
            run_id, subject_type, sources_total
        );

        let limit = self.config.max_concurrent_sources.max(1);
        let mut pending = source_ids.iter();
        let mut in_flight = FuturesUnordered::new();

        loop {
            while in_flight.len() < limit {
                match pending.next() {
                    Some(source_id) => {
                        in_flight.push(self.collect_source(&state, &batch_refreshes, source_id.as_str(), subject_type))
                    }
                    None => break,
                }
            }

            match in_flight.next().await {
                Some(succeeded) => {
                    let completed = state.record_source_done(!succeeded);
                    info!("{}/{} friends done", completed, sources_total);
                }
                None => break,
            }
        }

        drop(in_flight);

        // Batch refreshes still running must not land after the final one.
        for handle in batch_refreshes.into_inner() {
            if let Err(e) = handle.await {
                warn!("Background leaderboard refresh did not finish: {}", e);
            }
        }
        self.scheduler.refresh().await;

        let summary = RunSummary {
            run_id,
            subject_type,
            sources_total,
            sources_completed: state.sources_completed(),
            sources_failed: state.sources_failed(),
            total_fetched: state.total_fetched(),
            total_saved: state.total_saved(),
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            "Run {} complete: {} friends ({} failed), {} collections fetched, {} ratings saved",
            run_id, summary.sources_completed, summary.sources_failed, summary.total_fetched, summary.total_saved
        );
        summary
    }

    /// Run in the background. The receiver resolves exactly once, after every
    /// friend has either finished or failed.
    pub fn spawn_run(self: Arc<Self>, source_ids: Vec<String>, subject_type: SubjectType) -> oneshot::Receiver<RunSummary> {
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let summary = self.run(&source_ids, subject_type).await;
            if tx.send(summary).is_err() {
                warn!("Run finished but nobody is waiting for it");
            }
        });
        rx
    }

    /// Returns false when the friend's feed failed part way.
    async fn collect_source(
        &self,
        state: &RunState,
        batch_refreshes: &Mutex<Vec<JoinHandle<()>>>,
        source_id: &str,
        subject_type: SubjectType,
    ) -> bool {
        let mut pages = Box::pin(self.collector.collect(source_id, subject_type));

        while let Some(page) = pages.next().await {
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    warn!("Failed to fetch collections for friend {}: {}", source_id, e);
                    return false;
                }
            };

            state.record_fetched(page.contributions.len());

            for contribution in &page.contributions {
                match self.aggregator.merge_counted(state, source_id, contribution).await {
                    Ok(total_saved) => {
                        if let Some(handle) = self.scheduler.spawn_refresh_if_due(total_saved) {
                            batch_refreshes.lock().await.push(handle);
                        }
                    }
                    Err(e) => error!(
                        "Failed to save subject {} for friend {}: {}",
                        contribution.subject_id, source_id, e
                    ),
                }
            }

            info!(
                "Fetched {} collections for friend {} at offset {}",
                page.contributions.len(),
                source_id,
                page.offset
            );
        }

        info!("Successfully fetched collections for friend {}", source_id);
        true
    }
}
