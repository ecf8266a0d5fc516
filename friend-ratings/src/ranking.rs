use crate::traits::KeyValueStore;
use crate::types::{ItemRecord, RankingEntry, Result, RESERVED_KEYS};
use std::cmp::Ordering;
use std::sync::Arc;

/// Mean over a record's real ratings.
///
/// Zero means "not rated" and non-numeric values are foreign data; both are
/// left out of the sum and the count. Reserved identity keys are skipped by
/// name regardless of their value.
pub fn score_record(record: &ItemRecord) -> RankingEntry {
    let (total, count) = record
        .ratings
        .iter()
        .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
        .filter_map(|(_, value)| value.as_f64())
        .filter(|rate| rate.is_finite() && *rate != 0.0)
        .fold((0.0_f64, 0_usize), |(total, count), rate| (total + rate, count + 1));

    let average_rate = if count > 0 { total / count as f64 } else { 0.0 };

    RankingEntry {
        subject_id: record.subject_id,
        subject_name: record.subject_name.clone(),
        average_rate,
        num_rates: count,
    }
}

/// Sort descending by mean. Subjects nobody rated go last; ties keep the
/// input order.
pub fn rank_records(records: &[ItemRecord]) -> Vec<RankingEntry> {
    let mut entries: Vec<RankingEntry> = records.iter().map(score_record).collect();
    entries.sort_by(|a, b| {
        (b.num_rates > 0)
            .cmp(&(a.num_rates > 0))
            .then_with(|| b.average_rate.partial_cmp(&a.average_rate).unwrap_or(Ordering::Equal))
    });
    entries
}

/// Reads the whole store and ranks it. No locking against in-flight merges:
/// a refresh sees whatever has been written so far.
pub struct RankingComputer {
    store: Arc<dyn KeyValueStore>,
}

impl RankingComputer {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub async fn compute_ranking(&self) -> Result<Vec<RankingEntry>> {
        let records = self.store.get_all().await?;
        Ok(rank_records(&records))
    }
}
