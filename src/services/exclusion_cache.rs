//! Exclusion cache persistence (SPEC_FULL.md §4.4, C4).
//!
//! Wraps the pure `ExclusionCacheEntry` logic in `models::exclusion` with the
//! `requests_cache` table. Queries are written with runtime-checked
//! `sqlx::query`/`sqlx::query_as` rather than the compile-time `query!` macro
//! family (there's no live database at build time here, per SPEC_FULL.md
//! §10.5), in the teacher's `DnpListService`-over-`PgPool` shape.

use chrono::Utc;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::exclusion::{is_valid_exclusion, Excluded, ExclusionCacheEntry, ExclusionKey};

#[derive(Debug, FromRow)]
struct ExclusionCacheRow {
    id: Uuid,
    language: String,
    genre: String,
    niche_level: String,
    excluded: Json<Vec<Excluded>>,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

impl From<ExclusionCacheRow> for ExclusionCacheEntry {
    fn from(row: ExclusionCacheRow) -> Self {
        ExclusionCacheEntry {
            id: row.id,
            key: ExclusionKey { language: row.language, genre: row.genre, niche_level: row.niche_level },
            excluded: row.excluded.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub struct ExclusionCacheService {
    pool: PgPool,
    freshness_days: i64,
}

impl ExclusionCacheService {
    pub fn new(pool: PgPool, freshness_days: i64) -> Self {
        Self { pool, freshness_days }
    }

    /// `ensure(key) -> entry`: loads the cache row for `key`, creating an
    /// empty one on first use, and returns it with stale entries already
    /// filtered out (§4.4).
    pub async fn ensure(&self, key: ExclusionKey) -> Result<ExclusionCacheEntry, AppError> {
        if let Some(row) = sqlx::query_as::<_, ExclusionCacheRow>(
            "SELECT id, language, genre, niche_level, excluded, created_at, updated_at \
             FROM requests_cache WHERE language = $1 AND genre = $2 AND niche_level = $3",
        )
        .bind(&key.language)
        .bind(&key.genre)
        .bind(&key.niche_level)
        .fetch_optional(&self.pool)
        .await?
        {
            let mut entry: ExclusionCacheEntry = row.into();
            self.prune_stale(&mut entry);
            return Ok(entry);
        }

        let entry = ExclusionCacheEntry::empty(key);
        sqlx::query(
            "INSERT INTO requests_cache (id, language, genre, niche_level, excluded, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.id)
        .bind(&entry.key.language)
        .bind(&entry.key.genre)
        .bind(&entry.key.niche_level)
        .bind(Json(&entry.excluded))
        .bind(entry.created_at)
        .bind(entry.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(entry)
    }

    /// Drops entries that have aged out of the freshness window (§4.4);
    /// permanent reasons are retained by `is_valid_exclusion` regardless of age.
    fn prune_stale(&self, entry: &mut ExclusionCacheEntry) {
        let now = Utc::now();
        let freshness_days = self.freshness_days;
        entry.excluded.retain(|e| is_valid_exclusion(e, freshness_days, now));
    }

    /// Persists a newly-excluded artist into the entry's list (upsert by
    /// `metadata_id`, latest wins).
    pub async fn put(&self, entry_id: Uuid, excluded: Excluded) -> Result<(), AppError> {
        let mut loaded = self.load_by_id(entry_id).await?;
        loaded.put(excluded);
        self.persist(&loaded).await
    }

    /// Clears an artist's exclusion, e.g. after a manual override.
    pub async fn remove(&self, entry_id: Uuid, metadata_id: &str) -> Result<(), AppError> {
        let mut loaded = self.load_by_id(entry_id).await?;
        loaded.remove(metadata_id);
        self.persist(&loaded).await
    }

    async fn load_by_id(&self, entry_id: Uuid) -> Result<ExclusionCacheEntry, AppError> {
        let row = sqlx::query_as::<_, ExclusionCacheRow>(
            "SELECT id, language, genre, niche_level, excluded, created_at, updated_at \
             FROM requests_cache WHERE id = $1",
        )
        .bind(entry_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn persist(&self, entry: &ExclusionCacheEntry) -> Result<(), AppError> {
        sqlx::query("UPDATE requests_cache SET excluded = $1, updated_at = $2 WHERE id = $3")
            .bind(Json(&entry.excluded))
            .bind(entry.updated_at)
            .bind(entry.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
