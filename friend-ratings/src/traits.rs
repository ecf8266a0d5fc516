use crate::types::{Contribution, ItemRecord, RankingEntry, Result, SubjectType};
use async_trait::async_trait;

/// Fetches one page of a friend's collection feed.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// An empty vector means the feed is exhausted.
    async fn fetch_page(
        &self,
        source_id: &str,
        subject_type: SubjectType,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Contribution>>;
}

/// Persistent mapping from subject id to its aggregated record.
/// `put` must be atomic for a single record.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, subject_id: u64) -> Result<Option<ItemRecord>>;

    async fn put(&self, record: &ItemRecord) -> Result<()>;

    async fn get_all(&self) -> Result<Vec<ItemRecord>>;
}

/// Consumer of a freshly sorted leaderboard.
pub trait RenderSink: Send + Sync {
    fn render(&self, entries: &[RankingEntry]);
}
