use crate::traits::KeyValueStore;
use crate::types::{Contribution, ItemRecord, Result, RunState};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Folds friend ratings into per-subject records.
///
/// A merge is a read-modify-write of a single record. Merges that target the
/// same subject are serialised through a per-subject lock, so two friends
/// rating the same subject at once both end up in the record. Merges for
/// different subjects never wait on each other.
pub struct RatingAggregator {
    store: Arc<dyn KeyValueStore>,
    subject_locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl RatingAggregator {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            subject_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, subject_id: u64) -> Arc<Mutex<()>> {
        let mut locks = self.subject_locks.lock().await;
        locks.entry(subject_id).or_default().clone()
    }

    /// Drop the subject's lock once nobody else holds or waits on it.
    async fn release(&self, subject_id: u64, lock: Arc<Mutex<()>>) {
        let mut locks = self.subject_locks.lock().await;
        // One reference in the map, one held here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(&subject_id);
        }
        drop(lock);
    }

    /// Subjects with a merge in flight.
    pub async fn active_subjects(&self) -> usize {
        self.subject_locks.lock().await.len()
    }

    /// Set `source_id`'s slot in the subject's record. Re-merging the same
    /// friend's rating overwrites the slot instead of adding a second one.
    pub async fn merge(&self, source_id: &str, contribution: &Contribution) -> Result<ItemRecord> {
        let lock = self.lock_for(contribution.subject_id).await;
        let merged = {
            let _guard = lock.lock().await;
            self.merge_locked(source_id, contribution).await
        };
        self.release(contribution.subject_id, lock).await;
        merged
    }

    async fn merge_locked(&self, source_id: &str, contribution: &Contribution) -> Result<ItemRecord> {
        // The first stored name sticks.
        let mut record = self
            .store
            .get(contribution.subject_id)
            .await?
            .unwrap_or_else(|| ItemRecord::new(contribution.subject_id, contribution.subject_name.clone()));

        record
            .ratings
            .insert(source_id.to_string(), contribution.rate.into());

        self.store.put(&record).await?;

        debug!(
            "Merged rate {} from {} into subject {}",
            contribution.rate, source_id, contribution.subject_id
        );
        Ok(record)
    }

    /// Merge and count the contribution against the run. Returns the run's new
    /// saved total; nothing is counted when the store write fails.
    pub async fn merge_counted(&self, run: &RunState, source_id: &str, contribution: &Contribution) -> Result<u64> {
        self.merge(source_id, contribution).await?;
        Ok(run.record_saved())
    }
}
