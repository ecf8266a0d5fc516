#![allow(dead_code)]

use async_trait::async_trait;
use friend_ratings::{
    AggregatorError, Contribution, ItemRecord, KeyValueStore, MemoryStore, PageSource, RankingEntry, RenderSink, Result,
    SubjectType,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, Once};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn contribution(subject_id: u64, subject_name: &str, rate: u8) -> Contribution {
    Contribution {
        subject_id,
        subject_name: subject_name.to_string(),
        rate,
    }
}

#[derive(Clone)]
pub enum ScriptedPage {
    Items(Vec<Contribution>),
    Status(u16),
}

/// Serves pre-scripted pages per friend. Pages past the end of a script are empty.
#[derive(Default)]
pub struct ScriptedSource {
    scripts: HashMap<String, Vec<ScriptedPage>>,
    calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source_id: &str, pages: Vec<ScriptedPage>) -> Self {
        self.scripts.insert(source_id.to_string(), pages);
        self
    }

    pub fn calls(&self) -> Vec<(String, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_page(
        &self,
        source_id: &str,
        _subject_type: SubjectType,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Contribution>> {
        self.calls.lock().unwrap().push((source_id.to_string(), offset));

        let index = (offset / limit) as usize;
        match self.scripts.get(source_id).and_then(|pages| pages.get(index)) {
            Some(ScriptedPage::Items(items)) => Ok(items.clone()),
            Some(ScriptedPage::Status(status)) => Err(AggregatorError::PageFetch {
                source_id: source_id.to_string(),
                offset,
                status: *status,
            }),
            None => Ok(Vec::new()),
        }
    }
}

/// Keeps every leaderboard it is handed.
#[derive(Default)]
pub struct RecordingSink {
    renders: Mutex<Vec<Vec<RankingEntry>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Vec<RankingEntry>> {
        self.renders.lock().unwrap().last().cloned()
    }
}

impl RenderSink for RecordingSink {
    fn render(&self, entries: &[RankingEntry]) {
        self.renders.lock().unwrap().push(entries.to_vec());
    }
}

/// In-memory store that refuses writes for chosen subjects and can refuse to
/// list its records.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    rejected_puts: HashSet<u64>,
    fail_get_all: bool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reject_put(mut self, subject_id: u64) -> Self {
        self.rejected_puts.insert(subject_id);
        self
    }

    pub fn failing_get_all(mut self) -> Self {
        self.fail_get_all = true;
        self
    }
}

#[async_trait]
impl KeyValueStore for FlakyStore {
    async fn get(&self, subject_id: u64) -> Result<Option<ItemRecord>> {
        self.inner.get(subject_id).await
    }

    async fn put(&self, record: &ItemRecord) -> Result<()> {
        if self.rejected_puts.contains(&record.subject_id) {
            return Err(AggregatorError::General(format!("write rejected for subject {}", record.subject_id)));
        }
        self.inner.put(record).await
    }

    async fn get_all(&self) -> Result<Vec<ItemRecord>> {
        if self.fail_get_all {
            return Err(AggregatorError::General("store unavailable".to_string()));
        }
        self.inner.get_all().await
    }
}
