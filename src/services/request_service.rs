//! Request persistence (SPEC_FULL.md §4.7, C7).
//!
//! `PlaylistRequest::create`/`update_stats` in `models::request` are pure;
//! this service is the only thing that talks to the `requests` table.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::genre::GenreCatalog;
use crate::models::request::{PlaylistRequest, RequestParams};

pub struct RequestService {
    pool: PgPool,
}

impl RequestService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Validates and persists a new request record.
    pub async fn create(&self, user_id: Uuid, params: RequestParams) -> Result<PlaylistRequest, AppError> {
        let request = PlaylistRequest::create(user_id, params, GenreCatalog::global())?;

        sqlx::query(
            "INSERT INTO requests (id, user_id, params, stats, generated_playlist, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(request.id)
        .bind(request.user_id)
        .bind(&request.params)
        .bind(&request.stats)
        .bind(request.generated_playlist)
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(request)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<PlaylistRequest>, AppError> {
        let row = sqlx::query_as::<_, PlaylistRequest>(
            "SELECT id, user_id, params, stats, generated_playlist, created_at, updated_at \
             FROM requests WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    /// Persists the current in-memory `Stats` sub-document. Callers mutate
    /// `request` via `PlaylistRequest::update_stats` as tracks are selected,
    /// then flush it with this method (at minimum once the pipeline finishes).
    pub async fn save_stats(&self, request: &PlaylistRequest) -> Result<(), AppError> {
        sqlx::query("UPDATE requests SET stats = $1, updated_at = $2 WHERE id = $3")
            .bind(&request.stats)
            .bind(request.updated_at)
            .bind(request.id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Links a freshly-created playlist back to its request.
    pub async fn attach_playlist(&self, request_id: Uuid, playlist_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE requests SET generated_playlist = $1, updated_at = now() WHERE id = $2")
            .bind(playlist_id)
            .bind(request_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Clears the back-link, per `Playlist.delete()`'s contract in §4.7.
    pub async fn clear_generated_playlist(&self, request_id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE requests SET generated_playlist = NULL, updated_at = now() WHERE id = $1")
            .bind(request_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
