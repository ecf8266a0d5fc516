use crate::traits::KeyValueStore;
use crate::types::{ItemRecord, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// SQLite-backed ratings store. One row per subject; friend ratings are kept
/// as a JSON object so legacy values survive a round trip untouched.
pub struct SqliteStore {
    db: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

        // Every connection to an in-memory database is a separate database,
        // so keep exactly one alive for the lifetime of the pool.
        let pool_options = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let db = pool_options.connect_with(options).await?;

        let store = Self { db };
        store.ensure_schema().await?;

        info!("Opened ratings store at {}", database_url);
        Ok(store)
    }

    pub async fn in_memory() -> Result<Self> {
        Self::connect("sqlite::memory:").await
    }

    /// Safe to call repeatedly.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS friend_ratings (
                subject_id INTEGER PRIMARY KEY,
                subject_name TEXT NOT NULL,
                ratings TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub fn get_db_pool(&self) -> &SqlitePool {
        &self.db
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM friend_ratings")
            .fetch_one(&self.db)
            .await?;
        Ok(row.try_get("count")?)
    }

    fn record_from_row(row: &SqliteRow) -> Result<ItemRecord> {
        let subject_id: i64 = row.try_get("subject_id")?;
        let ratings_json: String = row.try_get("ratings")?;
        let ratings: BTreeMap<String, Value> = serde_json::from_str(&ratings_json)?;

        Ok(ItemRecord {
            subject_id: subject_id as u64,
            subject_name: row.try_get("subject_name")?,
            ratings,
        })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, subject_id: u64) -> Result<Option<ItemRecord>> {
        let row = sqlx::query(
            "SELECT subject_id, subject_name, ratings FROM friend_ratings WHERE subject_id = $1",
        )
        .bind(subject_id as i64)
        .fetch_optional(&self.db)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn put(&self, record: &ItemRecord) -> Result<()> {
        let ratings = serde_json::to_string(&record.ratings)?;

        sqlx::query(
            r#"
            INSERT INTO friend_ratings (subject_id, subject_name, ratings, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (subject_id) DO UPDATE SET
                subject_name = EXCLUDED.subject_name,
                ratings = EXCLUDED.ratings,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(record.subject_id as i64)
        .bind(&record.subject_name)
        .bind(ratings)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.db)
        .await?;

        debug!("Stored subject {} ({} ratings)", record.subject_id, record.ratings.len());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<ItemRecord>> {
        let rows = sqlx::query(
            "SELECT subject_id, subject_name, ratings FROM friend_ratings ORDER BY subject_id",
        )
        .fetch_all(&self.db)
        .await?;

        rows.iter().map(Self::record_from_row).collect()
    }
}

/// Process-local store with the same contract; nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<u64, ItemRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = ItemRecord>) -> Self {
        let records = records.into_iter().map(|r| (r.subject_id, r)).collect();
        Self {
            records: RwLock::new(records),
        }
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, subject_id: u64) -> Result<Option<ItemRecord>> {
        Ok(self.records.read().await.get(&subject_id).cloned())
    }

    async fn put(&self, record: &ItemRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.subject_id, record.clone());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<ItemRecord>> {
        let mut all: Vec<ItemRecord> = self.records.read().await.values().cloned().collect();
        all.sort_by_key(|r| r.subject_id);
        Ok(all)
    }
}

/// Load every record of a legacy JSON export (an array of flat objects) into `store`.
/// Returns (imported, skipped). Bad records are skipped individually.
pub async fn import_legacy(store: &dyn KeyValueStore, export: &Value) -> Result<(usize, usize)> {
    let items = export.as_array().ok_or_else(|| {
        crate::types::AggregatorError::InvalidRecord("expected a JSON array of records".to_string())
    })?;

    let mut imported = 0;
    let mut skipped = 0;
    for item in items {
        match ItemRecord::from_legacy(item) {
            Ok(record) => {
                store.put(&record).await?;
                imported += 1;
            }
            Err(e) => {
                tracing::warn!("Skipping legacy record: {}", e);
                skipped += 1;
            }
        }
    }

    info!("Imported {} legacy records ({} skipped)", imported, skipped);
    Ok((imported, skipped))
}
