//! NicheTrackFinder -- the selection pipeline (SPEC_FULL.md §4.6, C6).
//!
//! Owns no state across invocations; each call to `find` runs one request's
//! pipeline end to end: candidate pool -> chunked traversal -> scrobble/
//! streaming/language validation -> top-up -> final gate.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, NotEnoughSongs};
use crate::models::artist::is_conglomerate_page;
use crate::models::exclusion::{Excluded, ExclusionKey, ExclusionReason};
use crate::models::genre::{GenreCatalog, GenreService};
use crate::models::request::{MIN_SONGS_FOR_PLAYLIST_GEN, PLAYLIST_MAX_LENGTH, PLAYLIST_MIN_LENGTH};
use crate::models::{Artist, ArtistCatalogRow, PlaylistRequest, Track};
use crate::services::circuit_breaker::CircuitBreakerService;
use crate::services::exclusion_cache::ExclusionCacheService;
use crate::services::metadata_client::MetadataServiceClient;
use crate::services::scrobble_client::ScrobbleServiceClient;
use crate::services::streaming_client::StreamingServiceClient;
use crate::services::validator::{artist_reason_scrobble, artist_reason_streaming, language_reason, track_is_valid, ArtistThresholds};
use crate::config::PipelineConfig;
use crate::metrics::MetricsCollector;

pub struct NicheTrackFinder<'a> {
    pool: &'a PgPool,
    metadata: &'a MetadataServiceClient,
    scrobble: &'a ScrobbleServiceClient,
    streaming: &'a StreamingServiceClient,
    circuit_breakers: &'a CircuitBreakerService,
    exclusion_cache: &'a ExclusionCacheService,
    metrics: &'a MetricsCollector,
    config: &'a PipelineConfig,
}

impl<'a> NicheTrackFinder<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: &'a PgPool,
        metadata: &'a MetadataServiceClient,
        scrobble: &'a ScrobbleServiceClient,
        streaming: &'a StreamingServiceClient,
        circuit_breakers: &'a CircuitBreakerService,
        exclusion_cache: &'a ExclusionCacheService,
        metrics: &'a MetricsCollector,
        config: &'a PipelineConfig,
    ) -> Self {
        Self { pool, metadata, scrobble, streaming, circuit_breakers, exclusion_cache, metrics, config }
    }

    /// Runs the full selection pipeline for `request`, mutating its `Stats`
    /// sub-document as tracks are accepted (§4.6, §4.7).
    pub async fn find(&self, request: &mut PlaylistRequest) -> Result<Vec<Track>, AppError> {
        let catalog = GenreCatalog::global();
        let streaming_seed = catalog.is_streaming_seed(&request.params.genre);
        let metadata_genre = catalog
            .convert(GenreService::Streaming, GenreService::Metadata, &request.params.genre)
            .unwrap_or(request.params.genre.as_str());
        let scrobble_genre = catalog
            .convert(GenreService::Metadata, GenreService::Scrobble, metadata_genre)
            .unwrap_or(metadata_genre);

        let candidates = self.load_candidate_pool(metadata_genre).await?;
        let chunk_size = self.config.artist_chunk_size.max(1);
        let mut chunks: Vec<Vec<ArtistCatalogRow>> = candidates.chunks(chunk_size).map(|c| c.to_vec()).collect();
        let mut rng = rand::thread_rng();
        chunks.shuffle(&mut rng);

        let target = compute_target(request, streaming_seed);

        let key = ExclusionKey {
            language: request.params.language.as_key_str().to_string(),
            genre: metadata_genre.to_string(),
            niche_level: request.params.niche_level.as_key_str().to_string(),
        };
        let cache_entry = self.exclusion_cache.ensure(key).await?;
        let excluded_ids: HashSet<String> = cache_entry.excluded.iter().map(|e| e.metadata_id.clone()).collect();
        self.metrics.exclusion_cache_hits_total.with_label_values(&[metadata_genre]).inc_by(excluded_ids.len() as f64);

        let thresholds = ArtistThresholds::from_bands(request.niche_bands());
        let mut selected: Vec<Track> = Vec::new();
        let mut chunks_processed = 0u64;
        let mut previous_stats_count = 0u64;

        'chunks: for chunk in chunks {
            chunks_processed += 1;
            let mut survivors = Vec::new();

            for row in chunk {
                if excluded_ids.contains(&row.metadata_id) {
                    continue;
                }
                self.metrics.pipeline_artists_processed_total.with_label_values(&[metadata_genre]).inc();

                let mut artist = Artist::from_catalog_row(&row);
                let info = match self
                    .scrobble
                    .artist_info(self.circuit_breakers, &artist.metadata_id, &artist.name)
                    .await
                {
                    Ok(info) => info,
                    Err(_) => continue, // adapter failure: skip, no cache write (§7)
                };
                artist.attach_scrobble(info.listeners, info.playcount, info.tags, info.biography.clone());

                if is_conglomerate_page(&info.biography) {
                    continue; // Other: dropped without caching (§4.6 step 3b)
                }

                match artist_reason_scrobble(&artist, &thresholds, scrobble_genre) {
                    Some(ExclusionReason::Other) => continue,
                    Some(reason) => {
                        self.persist_exclusion(&cache_entry.id, &artist, reason, metadata_genre).await?;
                        continue;
                    }
                    None => survivors.push(artist),
                }
            }

            survivors.shuffle(&mut rng);

            for mut artist in survivors {
                if selected.len() >= target {
                    break 'chunks;
                }

                let mut songs_for_artist = 0usize;
                let top_tracks = match self
                    .scrobble
                    .artist_top_tracks(self.circuit_breakers, &artist.metadata_id, &artist.name, 10)
                    .await
                {
                    Ok(tracks) => tracks,
                    Err(_) => continue,
                };

                for stub in top_tracks {
                    if songs_for_artist >= self.config.max_songs_per_artist {
                        break;
                    }

                    let Ok(mut found) = self.streaming.search_tracks(self.circuit_breakers, &stub.name, &artist.name, 1).await
                    else {
                        continue;
                    };
                    let Some(track) = found.drain(..).next() else { continue };
                    let Some(streaming_artist_id) = track.streaming_artist_ids.first().cloned() else { continue };

                    if !artist.is_streaming_enriched() {
                        let Ok(streaming_artist) = self.streaming.artist(self.circuit_breakers, &streaming_artist_id).await
                        else {
                            continue;
                        };
                        if !artist.attach_streaming(&streaming_artist.name, streaming_artist.id, streaming_artist.followers) {
                            continue;
                        }

                        if let Some(reason) = artist_reason_streaming(&artist, &thresholds) {
                            self.persist_exclusion(&cache_entry.id, &artist, reason, metadata_genre).await?;
                            break;
                        }

                        let languages = self
                            .metadata
                            .artist_languages(self.circuit_breakers, &artist.metadata_id)
                            .await
                            .unwrap_or_default();
                        if let Some(reason) = language_reason(request.params.language, &languages) {
                            self.persist_exclusion(&cache_entry.id, &artist, reason, metadata_genre).await?;
                            break;
                        }

                        // Accepted: clear any stale cached exclusion for this artist (§4.6 step 3d).
                        self.exclusion_cache.remove(cache_entry.id, &artist.metadata_id).await?;
                    }

                    if !track_is_valid(&track, &request.params) {
                        continue;
                    }

                    selected.push(track);
                    songs_for_artist += 1;
                    self.metrics.pipeline_tracks_selected_total.with_label_values(&[metadata_genre, "chunk"]).inc();

                    let percent_valid = (selected.len() as f64) / ((chunks_processed as usize * chunk_size) as f64) * 100.0;
                    request.update_stats(artist.streaming_followers.map(|f| f as f64), Some(percent_valid), previous_stats_count);
                    previous_stats_count += 1;

                    if selected.len() >= target {
                        break;
                    }
                }
            }

            if selected.len() >= target {
                break;
            }
        }

        if selected.len() < PLAYLIST_MIN_LENGTH {
            self.top_up(&mut selected, request, streaming_seed).await?;
        }

        if selected.len() < MIN_SONGS_FOR_PLAYLIST_GEN {
            return Err(NotEnoughSongs { found: selected.len(), required: MIN_SONGS_FOR_PLAYLIST_GEN }.into());
        }

        Ok(selected)
    }

    async fn load_candidate_pool(&self, metadata_genre: &str) -> Result<Vec<ArtistCatalogRow>, AppError> {
        let rows = sqlx::query_as::<_, ArtistCatalogRow>(
            "SELECT id, metadata_id, name, genres FROM artists \
             WHERE EXISTS (SELECT 1 FROM jsonb_array_elements(genres) AS g WHERE g->>'name' = $1)",
        )
        .bind(metadata_genre)
        .fetch_all(self.pool)
        .await?;
        Ok(rows)
    }

    async fn persist_exclusion(
        &self,
        entry_id: &Uuid,
        artist: &Artist,
        reason: ExclusionReason,
        genre: &str,
    ) -> Result<(), AppError> {
        self.metrics
            .pipeline_artists_excluded_total
            .with_label_values(&[genre, reason.canonical_text()])
            .inc();
        self.metrics.exclusion_cache_writes_total.with_label_values(&[genre, reason.canonical_text()]).inc();
        let excluded = Excluded::new(artist.name.clone(), artist.metadata_id.clone(), reason);
        self.exclusion_cache.put(*entry_id, excluded).await
    }

    /// Top-up phase (§4.6 step 4): materializes a throwaway playlist, then
    /// iteratively requests streaming recommendations seeded with already
    /// selected artists, until `playlist_max_length` or the retry budget
    /// (`top_up_max_attempts` x `top_up_batch_size`) is exhausted. Candidates
    /// get the same artist/track validation as step 3, minus the language
    /// check -- a recommended track carries no metadata id to look it up by.
    async fn top_up(&self, selected: &mut Vec<Track>, request: &PlaylistRequest, streaming_seed: bool) -> Result<(), AppError> {
        let thresholds = ArtistThresholds::from_bands(request.niche_bands());
        let throwaway = self
            .streaming
            .playlist_create(
                self.circuit_breakers,
                &request.user_id.to_string(),
                "niche top-up scratch",
                "",
                false,
            )
            .await?;

        let seed_uris: Vec<String> = selected.iter().filter_map(|t| t.streaming_uri.clone()).collect();
        if !seed_uris.is_empty() {
            let _ = self.streaming.playlist_add_items(self.circuit_breakers, &throwaway.id, &seed_uris).await;
        }

        let mut rng = rand::thread_rng();
        let mut attempts = 0usize;

        while selected.len() < PLAYLIST_MAX_LENGTH && attempts < self.config.top_up_max_attempts {
            attempts += 1;

            let mut seed_artists: Vec<String> = selected
                .iter()
                .flat_map(|t| t.streaming_artist_ids.first().cloned())
                .collect::<HashSet<_>>()
                .into_iter()
                .collect();
            seed_artists.shuffle(&mut rng);
            seed_artists.truncate((MIN_SONGS_FOR_PLAYLIST_GEN - 1).max(1));

            let seed_genres = if streaming_seed { vec![request.params.genre.clone()] } else { vec![] };

            let batch_result = self
                .streaming
                .recommendations(
                    self.circuit_breakers,
                    &seed_artists,
                    &seed_genres,
                    (request.params.min_track_seconds as i64) * 1000,
                    (request.params.max_track_seconds as i64) * 1000,
                    self.config.top_up_batch_size as u32,
                )
                .await;

            let Ok(mut batch) = batch_result else { continue };
            batch.shuffle(&mut rng);

            for track in batch {
                if selected.len() >= PLAYLIST_MAX_LENGTH {
                    break;
                }
                if !track_is_valid(&track, &request.params) {
                    continue;
                }

                // Same artist validation as step 3, language check excluded:
                // a top-up track carries no metadata id to look languages up by.
                let Some(streaming_artist_id) = track.streaming_artist_ids.first() else { continue };
                let Ok(streaming_artist) = self.streaming.artist(self.circuit_breakers, streaming_artist_id).await
                else {
                    continue;
                };
                let candidate = Artist {
                    streaming_followers: Some(streaming_artist.followers),
                    ..Artist::default()
                };
                if artist_reason_streaming(&candidate, &thresholds).is_some() {
                    continue;
                }

                selected.push(track);
            }
        }

        let _ = self.streaming.playlist_unfollow(self.circuit_breakers, &throwaway.id).await;
        Ok(())
    }
}

/// Target sizing (§4.6 step 2). For streaming-seed genres the target is
/// simply `playlist_min_length`. Otherwise it is scaled down by the fraction
/// of artists historically found valid for this request
/// (`stats.percent_artists_valid`), read as the same ratio the spec's formula
/// calls `expected_valid_artists / (playlist_min_length x 5)` -- there is no
/// separate historical sample stored anywhere else to compute that ratio from.
fn compute_target(request: &PlaylistRequest, streaming_seed: bool) -> usize {
    if streaming_seed {
        return PLAYLIST_MIN_LENGTH;
    }
    let p = request.stats.percent_artists_valid.map(|v| v / 100.0).unwrap_or(1.0).clamp(0.0, 1.0);
    let scaled = (PLAYLIST_MIN_LENGTH as f64 * p).ceil() as usize;
    scaled.clamp(MIN_SONGS_FOR_PLAYLIST_GEN, PLAYLIST_MIN_LENGTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::request::{Language, NicheLevel, RequestParams, RequestStats};
    use chrono::Utc;

    fn request_with_stats(percent_valid: Option<f64>) -> PlaylistRequest {
        PlaylistRequest {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            params: sqlx::types::Json(RequestParams {
                genre: "sadcore".into(),
                language: Language::Any,
                niche_level: NicheLevel::Moderately,
                min_release_year: 0,
                min_track_seconds: 60,
                max_track_seconds: 600,
                public: true,
            }),
            stats: sqlx::types::Json(RequestStats { percent_artists_valid: percent_valid, average_artist_followers: None }),
            generated_playlist: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn target_is_min_length_for_streaming_seed_genres() {
        let request = request_with_stats(None);
        assert_eq!(compute_target(&request, true), PLAYLIST_MIN_LENGTH);
    }

    #[test]
    fn target_scales_down_for_thin_non_seed_genres() {
        let request = request_with_stats(Some(20.0));
        let target = compute_target(&request, false);
        assert!(target >= MIN_SONGS_FOR_PLAYLIST_GEN);
        assert!(target < PLAYLIST_MIN_LENGTH);
    }

    #[test]
    fn target_never_drops_below_floor() {
        let request = request_with_stats(Some(0.0));
        assert_eq!(compute_target(&request, false), MIN_SONGS_FOR_PLAYLIST_GEN);
    }
}
