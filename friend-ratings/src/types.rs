use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

pub use crate::subject::SubjectType;

/// Field names the legacy flat record format used for identity.
/// They are never contributor ratings, whatever value they carry.
pub const SUBJECT_ID_KEY: &str = "subject_id";
pub const SUBJECT_NAME_KEY: &str = "subject_name";
pub const RESERVED_KEYS: [&str; 2] = [SUBJECT_ID_KEY, SUBJECT_NAME_KEY];

/// One (subject, rating) fact reported by one friend's collection feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub subject_id: u64,
    pub subject_name: String,
    /// 0 means "collected but not rated".
    pub rate: u8,
}

/// Persisted per-subject aggregate of every friend's rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub subject_id: u64,
    pub subject_name: String,
    #[serde(default)]
    pub ratings: BTreeMap<String, Value>,
}

impl ItemRecord {
    pub fn new(subject_id: u64, subject_name: impl Into<String>) -> Self {
        Self {
            subject_id,
            subject_name: subject_name.into(),
            ratings: BTreeMap::new(),
        }
    }

    pub fn with_rating(mut self, source_id: impl Into<String>, rate: impl Into<Value>) -> Self {
        self.ratings.insert(source_id.into(), rate.into());
        self
    }

    /// Convert a flat legacy object (`{subject_id, subject_name, <friend>: rate, ...}`)
    /// into a record. Every key other than the reserved two becomes a rating slot.
    pub fn from_legacy(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| AggregatorError::InvalidRecord("expected a JSON object".to_string()))?;

        let subject_id = match object.get(SUBJECT_ID_KEY) {
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            _ => None,
        }
        .ok_or_else(|| AggregatorError::InvalidRecord(format!("missing or invalid {}", SUBJECT_ID_KEY)))?;

        let subject_name = object
            .get(SUBJECT_NAME_KEY)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| subject_id.to_string());

        let ratings = object
            .iter()
            .filter(|(key, _)| !RESERVED_KEYS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            subject_id,
            subject_name,
            ratings,
        })
    }
}

/// Derived leaderboard row. Recomputed on every refresh, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingEntry {
    pub subject_id: u64,
    pub subject_name: String,
    pub average_rate: f64,
    pub num_rates: usize,
}

/// One page of one friend's collection feed.
#[derive(Debug, Clone)]
pub struct Page {
    pub offset: u32,
    pub contributions: Vec<Contribution>,
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub page_limit: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.bgm.tv/v0".to_string(),
            user_agent: "friend-ratings/0.1 (https://github.com/Adachi-Git)".to_string(),
            timeout_seconds: 30,
            page_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// Merges between automatic leaderboard refreshes.
    pub batch_size: u64,
    /// 1 keeps sources strictly sequential.
    pub max_concurrent_sources: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_sources: 1,
        }
    }
}

/// Counters scoped to a single orchestration run.
#[derive(Debug, Default)]
pub struct RunState {
    total_saved: AtomicU64,
    total_fetched: AtomicU64,
    sources_completed: AtomicU64,
    sources_failed: AtomicU64,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the new total.
    pub fn record_saved(&self) -> u64 {
        self.total_saved.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record_fetched(&self, count: usize) -> u64 {
        self.total_fetched.fetch_add(count as u64, Ordering::SeqCst) + count as u64
    }

    /// Returns the number of sources finished so far, this one included.
    pub fn record_source_done(&self, failed: bool) -> u64 {
        if failed {
            self.sources_failed.fetch_add(1, Ordering::SeqCst);
        }
        self.sources_completed.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn total_saved(&self) -> u64 {
        self.total_saved.load(Ordering::SeqCst)
    }

    pub fn total_fetched(&self) -> u64 {
        self.total_fetched.load(Ordering::SeqCst)
    }

    pub fn sources_completed(&self) -> u64 {
        self.sources_completed.load(Ordering::SeqCst)
    }

    pub fn sources_failed(&self) -> u64 {
        self.sources_failed.load(Ordering::SeqCst)
    }
}

/// Delivered once per run through the completion channel.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub subject_type: SubjectType,
    pub sources_total: usize,
    pub sources_completed: u64,
    pub sources_failed: u64,
    pub total_fetched: u64,
    pub total_saved: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to fetch collections for user {source_id} at offset {offset}. Status code: {status}")]
    PageFetch {
        source_id: String,
        offset: u32,
        status: u16,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Invalid subject type: {0}")]
    InvalidSubjectType(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("General error: {0}")]
    General(String),
}

pub type Result<T> = std::result::Result<T, AggregatorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_record_splits_reserved_keys_from_ratings() {
        let value = json!({"subject_id": 42, "subject_name": "X", "alice": 8, "bob": 0});
        let record = ItemRecord::from_legacy(&value).unwrap();
        assert_eq!(record.subject_id, 42);
        assert_eq!(record.subject_name, "X");
        assert_eq!(record.ratings.len(), 2);
        assert_eq!(record.ratings["alice"], json!(8));
    }

    #[test]
    fn legacy_record_accepts_string_id_and_missing_name() {
        let record = ItemRecord::from_legacy(&json!({"subject_id": "7"})).unwrap();
        assert_eq!(record.subject_id, 7);
        assert_eq!(record.subject_name, "7");
        assert!(record.ratings.is_empty());
    }

    #[test]
    fn legacy_record_without_id_is_rejected() {
        assert!(ItemRecord::from_legacy(&json!({"subject_name": "X"})).is_err());
        assert!(ItemRecord::from_legacy(&json!([1, 2])).is_err());
    }

    #[test]
    fn run_state_counts_sources() {
        let state = RunState::new();
        assert_eq!(state.record_source_done(false), 1);
        assert_eq!(state.record_source_done(true), 2);
        assert_eq!(state.sources_failed(), 1);
        assert_eq!(state.record_fetched(50), 50);
        assert_eq!(state.record_saved(), 1);
    }
}
