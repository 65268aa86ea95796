//! Vector index: persisted chunk vectors plus nearest-neighbour queries.
//!
//! The [`VectorIndex`] trait has two implementations:
//! - [`SqliteIndex`]: vectors as little-endian `f32` BLOBs in SQLite, scored
//!   by brute-force cosine similarity.
//! - [`MemoryIndex`]: the same semantics over a `Vec` behind a lock, for
//!   tests and dry runs.
//!
//! Entries are never updated or deleted one by one. The only way to remove
//! data is [`VectorIndex::reset`], which empties the index and records the
//! embedding model the new index is built with. Ties in similarity are
//! broken by insertion order.

use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::migrate;
use crate::models::{IndexEntry, ScoredEntry};

/// Model metadata recorded when an index is (re)built.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexMeta {
    pub model: String,
    /// Vector length. `0` until the first entry is added.
    pub dims: usize,
    /// RFC 3339 timestamp of the last reset.
    pub built_at: String,
}

impl IndexMeta {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            dims: 0,
            built_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Remove every entry and start a new index for `model`.
    async fn reset(&self, model: &str) -> Result<()>;

    /// Append entries atomically: either all are stored or none are.
    async fn add(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Destructive create-from-scratch.
    async fn build(&self, model: &str, entries: &[IndexEntry]) -> Result<()> {
        self.reset(model).await?;
        self.add(entries).await
    }

    /// Top-`k` entries by cosine similarity, best first.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>>;

    async fn count(&self) -> Result<usize>;

    /// Metadata of the current index, or `None` if it was never built.
    async fn meta(&self) -> Result<Option<IndexMeta>>;
}

/// Check a batch against the recorded dimensions and return the batch's dims.
fn check_dims(entries: &[IndexEntry], recorded: usize) -> Result<usize> {
    let dims = if recorded > 0 {
        recorded
    } else {
        entries.first().map(|e| e.vector.len()).unwrap_or(0)
    };
    for entry in entries {
        if entry.vector.is_empty() {
            bail!("empty vector for chunk {}", entry.chunk.id);
        }
        if entry.vector.len() != dims {
            bail!(
                "vector for chunk {} has {} dimensions, index expects {}",
                entry.chunk.id,
                entry.vector.len(),
                dims
            );
        }
    }
    Ok(dims)
}

/// Stable sort by descending score, so equal scores keep insertion order.
fn rank(mut scored: Vec<ScoredEntry>, k: usize) -> Vec<ScoredEntry> {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(k);
    scored
}

// ============ In-memory index ============

#[derive(Default)]
struct MemoryState {
    entries: Vec<IndexEntry>,
    meta: Option<IndexMeta>,
}

/// In-memory index for tests and `ingest --dry-run`.
#[derive(Default)]
pub struct MemoryIndex {
    state: RwLock<MemoryState>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow!("index lock poisoned")
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn reset(&self, model: &str) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        state.entries.clear();
        state.meta = Some(IndexMeta::new(model));
        Ok(())
    }

    async fn add(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut state = self.state.write().map_err(poisoned)?;
        let recorded = state.meta.as_ref().map(|m| m.dims).unwrap_or(0);
        let dims = check_dims(entries, recorded)?;
        if state.entries.iter().any(|e| entries.iter().any(|n| n.chunk.id == e.chunk.id)) {
            bail!("duplicate chunk id in index");
        }
        state.entries.extend_from_slice(entries);
        if let Some(meta) = state.meta.as_mut() {
            meta.dims = dims;
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        let state = self.state.read().map_err(poisoned)?;
        if let Some(meta) = &state.meta {
            if meta.dims > 0 && meta.dims != vector.len() {
                bail!(
                    "query vector has {} dimensions, index has {}",
                    vector.len(),
                    meta.dims
                );
            }
        }
        let scored = state
            .entries
            .iter()
            .map(|e| ScoredEntry {
                chunk_id: e.chunk.id.clone(),
                source: e.chunk.source.clone(),
                page: e.chunk.page,
                text: e.chunk.text.clone(),
                score: cosine_similarity(vector, &e.vector),
            })
            .collect();
        Ok(rank(scored, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().map_err(poisoned)?.entries.len())
    }

    async fn meta(&self) -> Result<Option<IndexMeta>> {
        Ok(self.state.read().map_err(poisoned)?.meta.clone())
    }
}

// ============ SQLite index ============

const META_MODEL: &str = "model";
const META_DIMS: &str = "dims";
const META_BUILT_AT: &str = "built_at";

/// SQLite-backed index. Schema is created on open.
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = db::connect_path(path).await?;
        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn recorded_dims(&self) -> Result<usize> {
        let dims: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?")
                .bind(META_DIMS)
                .fetch_optional(&self.pool)
                .await?;
        Ok(dims.and_then(|d| d.parse().ok()).unwrap_or(0))
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn reset(&self, model: &str) -> Result<()> {
        let meta = IndexMeta::new(model);
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM index_entries")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM index_meta")
            .execute(&mut *tx)
            .await?;
        for (key, value) in [
            (META_MODEL, meta.model.clone()),
            (META_DIMS, meta.dims.to_string()),
            (META_BUILT_AT, meta.built_at.clone()),
        ] {
            sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn add(&self, entries: &[IndexEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let dims = check_dims(entries, self.recorded_dims().await?)?;

        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let c = &entry.chunk;
            sqlx::query(
                r#"
                INSERT INTO index_entries
                    (chunk_id, source, page, chunk_index, start_offset, text, hash, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&c.id)
            .bind(&c.source)
            .bind(c.page as i64)
            .bind(c.chunk_index as i64)
            .bind(c.start as i64)
            .bind(&c.text)
            .bind(&c.hash)
            .bind(vec_to_blob(&entry.vector))
            .execute(&mut *tx)
            .await?;
        }
        sqlx::query("INSERT OR REPLACE INTO index_meta (key, value) VALUES (?, ?)")
            .bind(META_DIMS)
            .bind(dims.to_string())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>> {
        let dims = self.recorded_dims().await?;
        if dims > 0 && dims != vector.len() {
            bail!(
                "query vector has {} dimensions, index has {}",
                vector.len(),
                dims
            );
        }

        let rows = sqlx::query(
            "SELECT chunk_id, source, page, text, embedding FROM index_entries ORDER BY seq",
        )
        .fetch_all(&self.pool)
        .await?;

        let scored = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let page: i64 = row.get("page");
                ScoredEntry {
                    chunk_id: row.get("chunk_id"),
                    source: row.get("source"),
                    page: page as u32,
                    text: row.get("text"),
                    score: cosine_similarity(vector, &blob_to_vec(&blob)),
                }
            })
            .collect();
        Ok(rank(scored, k))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_entries")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }

    async fn meta(&self) -> Result<Option<IndexMeta>> {
        let rows = sqlx::query("SELECT key, value FROM index_meta")
            .fetch_all(&self.pool)
            .await?;
        let mut model = None;
        let mut dims = 0usize;
        let mut built_at = String::new();
        for row in &rows {
            let key: String = row.get("key");
            let value: String = row.get("value");
            match key.as_str() {
                META_MODEL => model = Some(value),
                META_DIMS => dims = value.parse().unwrap_or(0),
                META_BUILT_AT => built_at = value,
                _ => {}
            }
        }
        Ok(model.map(|model| IndexMeta {
            model,
            dims,
            built_at,
        }))
    }
}
