//! Playlist materialization and persistence (SPEC_FULL.md §4.7, C7).

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::playlist::Playlist;
use crate::models::{PlaylistRequest, Track};
use crate::services::circuit_breaker::CircuitBreakerService;
use crate::services::request_service::RequestService;
use crate::services::streaming_client::StreamingServiceClient;

/// `playlist_add_items` batches at most this many uris per call (§4.7).
const ADD_ITEMS_BATCH_SIZE: usize = 100;

pub struct PlaylistService<'a> {
    pool: &'a PgPool,
    streaming: &'a StreamingServiceClient,
    circuit_breakers: &'a CircuitBreakerService,
    requests: &'a RequestService,
}

impl<'a> PlaylistService<'a> {
    pub fn new(
        pool: &'a PgPool,
        streaming: &'a StreamingServiceClient,
        circuit_breakers: &'a CircuitBreakerService,
        requests: &'a RequestService,
    ) -> Self {
        Self { pool, streaming, circuit_breakers, requests }
    }

    /// `Playlist.create(tracks, request)` (§4.7): materializes the playlist on
    /// the streaming service, persists the record, and links it back to the
    /// request. Cover-image upload is out of scope and is not performed.
    pub async fn create(
        &self,
        request: &PlaylistRequest,
        tracks: &[Track],
        time_to_generate_minutes: Option<f64>,
    ) -> Result<Playlist, AppError> {
        let created = self
            .streaming
            .playlist_create(
                self.circuit_breakers,
                &request.user_id.to_string(),
                &crate::models::playlist::playlist_name(&request.params.genre),
                crate::models::playlist::PLAYLIST_DESCRIPTION,
                request.params.public,
            )
            .await?;

        let uris: Vec<String> = tracks.iter().filter_map(|t| t.streaming_uri.clone()).collect();
        for batch in uris.chunks(ADD_ITEMS_BATCH_SIZE) {
            self.streaming.playlist_add_items(self.circuit_breakers, &created.id, batch).await?;
        }

        let playlist = Playlist::new(
            request.user_id,
            &request.params.genre,
            created.id,
            created.url,
            tracks.len() as i32,
            time_to_generate_minutes,
            request.id,
        );

        sqlx::query(
            "INSERT INTO playlists (id, user_id, name, description, streaming_playlist_id, streaming_url, \
             generated_length, time_to_generate_minutes, request_id, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(playlist.id)
        .bind(playlist.user_id)
        .bind(&playlist.name)
        .bind(&playlist.description)
        .bind(&playlist.streaming_playlist_id)
        .bind(&playlist.streaming_url)
        .bind(playlist.generated_length)
        .bind(playlist.time_to_generate_minutes)
        .bind(playlist.request_id)
        .bind(playlist.created_at)
        .bind(playlist.updated_at)
        .execute(self.pool)
        .await?;

        self.requests.attach_playlist(request.id, playlist.id).await?;

        Ok(playlist)
    }

    /// `Playlist.add_track(track)`: appends a single track on both the
    /// streaming service and the persisted record.
    pub async fn add_track(&self, playlist: &mut Playlist, track: &Track) -> Result<(), AppError> {
        let Some(uri) = track.streaming_uri.clone() else {
            return Ok(());
        };
        self.streaming
            .playlist_add_items(self.circuit_breakers, &playlist.streaming_playlist_id, &[uri])
            .await?;

        playlist.generated_length += 1;
        sqlx::query("UPDATE playlists SET generated_length = $1, updated_at = now() WHERE id = $2")
            .bind(playlist.generated_length)
            .bind(playlist.id)
            .execute(self.pool)
            .await?;

        Ok(())
    }

    /// `Playlist.delete()`: unfollows on the streaming service, deletes the
    /// persisted record, and clears `generated_playlist` on its request.
    pub async fn delete(&self, playlist: &Playlist) -> Result<(), AppError> {
        self.streaming.playlist_unfollow(self.circuit_breakers, &playlist.streaming_playlist_id).await?;

        sqlx::query("DELETE FROM playlists WHERE id = $1").bind(playlist.id).execute(self.pool).await?;
        self.requests.clear_generated_playlist(playlist.request_id).await?;

        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Playlist>, AppError> {
        let row = sqlx::query_as::<_, Playlist>(
            "SELECT id, user_id, name, description, streaming_playlist_id, streaming_url, generated_length, \
             time_to_generate_minutes, request_id, created_at, updated_at FROM playlists WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row)
    }
}
