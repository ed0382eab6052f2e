//! Persistent price cache.
//!
//! Resolved transaction prices are stored under `"txn-" + hash` as decimal
//! strings. An entry is written once and never changes afterwards, with one
//! exception: the sentinel `"0"` marks a previous attempt that found no
//! price, so it reads as a miss and may be overwritten by a later attempt.

use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use sqlx::{sqlite::SqlitePoolOptions, Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

pub const CACHE_KEY_PREFIX: &str = "txn-";

/// Stored for transactions whose price resolved to zero.
pub const UNRESOLVED_SENTINEL: &str = "0";

pub fn cache_key(hash: &str) -> String {
    format!("{}{}", CACHE_KEY_PREFIX, hash)
}

/// Key-value contract for the price cache. The lifecycle of the backing
/// store belongs to whoever constructs the resolver.
#[async_trait]
pub trait PriceCache: Send + Sync {
    /// Returns the raw stored value, sentinel included.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` unless a non-sentinel value already exists.
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// SQLite-backed cache that survives process restarts.
pub struct SqlitePriceCache {
    pool: Pool<Sqlite>,
}

impl SqlitePriceCache {
    /// Opens (creating if needed) the cache database at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let url = format!("sqlite:{}?mode=rwc", path.as_ref().display());
        Self::connect(&url).await
    }

    /// Connects with an explicit sqlx URL such as `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            // A single connection keeps writes serialized and makes
            // in-memory databases visible to every query.
            .max_connections(1)
            .connect(url)
            .await
            .context("Failed to connect to price cache database")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await
        .context("Failed to create price_cache table")?;

        info!("SqlitePriceCache connected to {}", url);
        Ok(Self { pool })
    }

    /// Number of stored entries, sentinels included.
    pub async fn len(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM price_cache")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count price cache entries")?;
        Ok(count.0)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PriceCache for SqlitePriceCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM price_cache WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to read price cache entry {}", key))?;
        Ok(row.map(|(value,)| value))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        debug!("Storing price cache entry {} = {}", key, value);
        sqlx::query(
            r#"
            INSERT INTO price_cache (key, value, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            WHERE price_cache.value = ?;
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().timestamp())
        .bind(UNRESOLVED_SENTINEL)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to write price cache entry {}", key))?;
        Ok(())
    }
}

/// In-process cache for tests and one-shot runs.
pub struct MemoryPriceCache {
    entries: Cache<String, String>,
}

impl MemoryPriceCache {
    pub fn new(max_entries: u64) -> Self {
        Self {
            entries: Cache::builder().max_capacity(max_entries).build(),
        }
    }
}

impl Default for MemoryPriceCache {
    fn default() -> Self {
        Self::new(100_000)
    }
}

#[async_trait]
impl PriceCache for MemoryPriceCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        match self.entries.get(key).await {
            Some(existing) if existing != UNRESOLVED_SENTINEL => {}
            _ => self.entries.insert(key.to_string(), value.to_string()).await,
        }
        Ok(())
    }
}
