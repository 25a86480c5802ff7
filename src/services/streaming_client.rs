//! Streaming-service adapter (SPEC_FULL.md §4.1, §6, C1).
//!
//! The end-user music service the playlist is materialized on, and the
//! source of the recommender used for top-up. Modeled on the Spotify Web API
//! shape: bearer-token auth, `/search`, `/artists/{id}`, `/recommendations`,
//! `/playlists` endpoints. Acquiring/refreshing the bearer token is out of
//! scope (§1); `access_token` is assumed valid for the process lifetime.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::StreamingServiceConfig;
use crate::error::{AppError, ServiceError, ServiceErrorKind};
use crate::models::track::release_year_from_date;
use crate::models::Track;
use crate::recovery::{retry_with_backoff, RetryConfig};
use crate::services::circuit_breaker::CircuitBreakerService;
use crate::services::rate_limiter::AdapterRateLimiter;

const PROVIDER: &str = "streaming";

/// `artist(id) -> StreamingArtist` (§4.1): followers, genres.
#[derive(Debug, Clone)]
pub struct StreamingArtist {
    pub id: String,
    pub name: String,
    pub followers: i64,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CreatedPlaylist {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    items: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    name: String,
    uri: String,
    external_urls: ExternalUrls,
    duration_ms: i64,
    album: Album,
    artists: Vec<RawArtistRef>,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    release_date: String,
}

#[derive(Debug, Deserialize)]
struct RawArtistRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RecommendationsResponse {
    tracks: Vec<RawTrack>,
}

#[derive(Debug, Deserialize)]
struct RawArtist {
    id: String,
    name: String,
    followers: RawFollowers,
    #[serde(default)]
    genres: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawFollowers {
    total: i64,
}

#[derive(Debug, Deserialize)]
struct RawPlaylist {
    id: String,
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
pub struct PlaylistItemsPage {
    pub items: Vec<serde_json::Value>,
    pub total: i64,
}

impl RawTrack {
    fn into_track(self, artist_name: &str) -> Track {
        let mut track = Track::new(self.name, artist_name);
        track.attach_streaming_info(
            self.uri,
            self.external_urls.spotify,
            (self.duration_ms / 1000) as i32,
            release_year_from_date(&self.album.release_date).unwrap_or(0),
            self.artists.into_iter().map(|a| a.id).collect(),
        );
        track
    }
}

pub struct StreamingServiceClient {
    http: Client,
    config: StreamingServiceConfig,
    rate_limiter: AdapterRateLimiter,
}

impl StreamingServiceClient {
    pub fn new(config: StreamingServiceConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .build()
            .expect("streaming HTTP client must build with valid TLS config");

        Self {
            rate_limiter: AdapterRateLimiter::new(config.requests_per_second),
            http,
            config,
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.config.access_token)
    }

    /// `search_tracks(name, artist, limit) -> [StreamingTrack]` (fielded search).
    pub async fn search_tracks(
        &self,
        circuit_breakers: &CircuitBreakerService,
        name: &str,
        artist: &str,
        limit: u32,
    ) -> Result<Vec<Track>, AppError> {
        guard(circuit_breakers).await?;
        let result = retry_with_backoff(
            || self.do_search_tracks(name, artist, limit),
            &RetryConfig::default(),
            "streaming.search_tracks",
        )
        .await;
        record_outcome(circuit_breakers, &result).await;
        result
    }

    async fn do_search_tracks(&self, name: &str, artist: &str, limit: u32) -> Result<Vec<Track>, AppError> {
        let _permit = self.rate_limiter.acquire().await;
        let query = format!("track:{name} artist:{artist}");
        let url = format!("{}/search", self.config.base_url);

        debug!(query, "searching streaming service for track");
        let response = self
            .authed(self.http.get(&url))
            .query(&[("q", query.as_str()), ("type", "track"), ("limit", &limit.to_string())])
            .send()
            .await
            .map_err(|e| service_error_from_transport(&e))?;

        let response = classify_status(response).await?;
        let parsed: SearchResponse = parse_json(response).await?;
        Ok(parsed.tracks.items.into_iter().map(|t| t.into_track(artist)).collect())
    }

    /// `artist(id) -> StreamingArtist`.
    pub async fn artist(
        &self,
        circuit_breakers: &CircuitBreakerService,
        id: &str,
    ) -> Result<StreamingArtist, AppError> {
        guard(circuit_breakers).await?;
        let result = retry_with_backoff(
            || self.do_get_artist(id),
            &RetryConfig::default(),
            "streaming.artist",
        )
        .await;
        record_outcome(circuit_breakers, &result).await;
        result
    }

    async fn do_get_artist(&self, id: &str) -> Result<StreamingArtist, AppError> {
        let _permit = self.rate_limiter.acquire().await;
        let url = format!("{}/artists/{}", self.config.base_url, id);
        let response = self.authed(self.http.get(&url)).send().await.map_err(|e| service_error_from_transport(&e))?;
        let response = classify_status(response).await?;
        let parsed: RawArtist = parse_json(response).await?;
        Ok(StreamingArtist {
            id: parsed.id,
            name: parsed.name,
            followers: parsed.followers.total,
            genres: parsed.genres,
        })
    }

    /// `artist_top_tracks(id) -> [StreamingTrack]`.
    pub async fn artist_top_tracks(
        &self,
        circuit_breakers: &CircuitBreakerService,
        id: &str,
        artist_name: &str,
    ) -> Result<Vec<Track>, AppError> {
        guard(circuit_breakers).await?;
        let result = retry_with_backoff(
            || self.do_artist_top_tracks(id, artist_name),
            &RetryConfig::default(),
            "streaming.artist_top_tracks",
        )
        .await;
        record_outcome(circuit_breakers, &result).await;
        result
    }

    async fn do_artist_top_tracks(&self, id: &str, artist_name: &str) -> Result<Vec<Track>, AppError> {
        let _permit = self.rate_limiter.acquire().await;
        let url = format!("{}/artists/{}/top-tracks", self.config.base_url, id);
        let response = self
            .authed(self.http.get(&url))
            .query(&[("market", "US")])
            .send()
            .await
            .map_err(|e| service_error_from_transport(&e))?;
        let response = classify_status(response).await?;
        #[derive(Deserialize)]
        struct TopTracksResponse {
            tracks: Vec<RawTrack>,
        }
        let parsed: TopTracksResponse = parse_json(response).await?;
        Ok(parsed.tracks.into_iter().map(|t| t.into_track(artist_name)).collect())
    }

    /// `recommendations(seed_artists, seed_genres, min_ms, max_ms, limit) -> [StreamingTrack]`.
    pub async fn recommendations(
        &self,
        circuit_breakers: &CircuitBreakerService,
        seed_artists: &[String],
        seed_genres: &[String],
        min_ms: i64,
        max_ms: i64,
        limit: u32,
    ) -> Result<Vec<Track>, AppError> {
        guard(circuit_breakers).await?;
        let result = retry_with_backoff(
            || self.do_recommendations(seed_artists, seed_genres, min_ms, max_ms, limit),
            &RetryConfig::default(),
            "streaming.recommendations",
        )
        .await;
        record_outcome(circuit_breakers, &result).await;
        result
    }

    async fn do_recommendations(
        &self,
        seed_artists: &[String],
        seed_genres: &[String],
        min_ms: i64,
        max_ms: i64,
        limit: u32,
    ) -> Result<Vec<Track>, AppError> {
        let _permit = self.rate_limiter.acquire().await;
        let url = format!("{}/recommendations", self.config.base_url);

        let mut query = vec![
            ("seed_artists".to_string(), seed_artists.join(",")),
            ("min_duration_ms".to_string(), min_ms.to_string()),
            ("max_duration_ms".to_string(), max_ms.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if !seed_genres.is_empty() {
            query.push(("seed_genres".to_string(), seed_genres.join(",")));
        }

        let response = self
            .authed(self.http.get(&url))
            .query(&query)
            .send()
            .await
            .map_err(|e| service_error_from_transport(&e))?;
        let response = classify_status(response).await?;
        let parsed: RecommendationsResponse = parse_json(response).await?;
        Ok(parsed
            .tracks
            .into_iter()
            .map(|t| {
                let artist_name = t.artists.first().map(|a| a.id.clone()).unwrap_or_default();
                t.into_track(&artist_name)
            })
            .collect())
    }

    /// `playlist_create(user, name, description, public) -> Playlist`.
    pub async fn playlist_create(
        &self,
        circuit_breakers: &CircuitBreakerService,
        user: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<CreatedPlaylist, AppError> {
        guard(circuit_breakers).await?;
        let result = retry_with_backoff(
            || self.do_playlist_create(user, name, description, public),
            &RetryConfig::default(),
            "streaming.playlist_create",
        )
        .await;
        record_outcome(circuit_breakers, &result).await;
        result
    }

    async fn do_playlist_create(
        &self,
        user: &str,
        name: &str,
        description: &str,
        public: bool,
    ) -> Result<CreatedPlaylist, AppError> {
        let _permit = self.rate_limiter.acquire().await;
        let url = format!("{}/users/{}/playlists", self.config.base_url, user);
        let body = serde_json::json!({ "name": name, "description": description, "public": public });

        let response = self
            .authed(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| service_error_from_transport(&e))?;
        let response = classify_status(response).await?;
        let parsed: RawPlaylist = parse_json(response).await?;
        Ok(CreatedPlaylist { id: parsed.id, url: parsed.external_urls.spotify })
    }

    /// `playlist_add_items(playlist_id, uris[])`. Callers are responsible for
    /// batching to at most 100 uris per call (§4.7).
    pub async fn playlist_add_items(
        &self,
        circuit_breakers: &CircuitBreakerService,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), AppError> {
        guard(circuit_breakers).await?;
        let result = retry_with_backoff(
            || self.do_playlist_add_items(playlist_id, uris),
            &RetryConfig::default(),
            "streaming.playlist_add_items",
        )
        .await;
        record_outcome(circuit_breakers, &result).await;
        result
    }

    async fn do_playlist_add_items(&self, playlist_id: &str, uris: &[String]) -> Result<(), AppError> {
        let _permit = self.rate_limiter.acquire().await;
        let url = format!("{}/playlists/{}/tracks", self.config.base_url, playlist_id);
        let body = serde_json::json!({ "uris": uris });
        let response = self
            .authed(self.http.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| service_error_from_transport(&e))?;
        classify_status(response).await?;
        Ok(())
    }

    /// `playlist_remove(playlist_id, uris[])`.
    pub async fn playlist_remove(
        &self,
        circuit_breakers: &CircuitBreakerService,
        playlist_id: &str,
        uris: &[String],
    ) -> Result<(), AppError> {
        guard(circuit_breakers).await?;
        let result = retry_with_backoff(
            || self.do_playlist_remove(playlist_id, uris),
            &RetryConfig::default(),
            "streaming.playlist_remove",
        )
        .await;
        record_outcome(circuit_breakers, &result).await;
        result
    }

    async fn do_playlist_remove(&self, playlist_id: &str, uris: &[String]) -> Result<(), AppError> {
        let _permit = self.rate_limiter.acquire().await;
        let url = format!("{}/playlists/{}/tracks", self.config.base_url, playlist_id);
        let body = serde_json::json!({ "tracks": uris.iter().map(|u| serde_json::json!({ "uri": u })).collect::<Vec<_>>() });
        let response = self
            .authed(self.http.delete(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| service_error_from_transport(&e))?;
        classify_status(response).await?;
        Ok(())
    }

    /// `playlist_unfollow(id)` -- deletes (unfollows) the playlist.
    pub async fn playlist_unfollow(
        &self,
        circuit_breakers: &CircuitBreakerService,
        playlist_id: &str,
    ) -> Result<(), AppError> {
        guard(circuit_breakers).await?;
        let result = retry_with_backoff(
            || self.do_playlist_unfollow(playlist_id),
            &RetryConfig::default(),
            "streaming.playlist_unfollow",
        )
        .await;
        record_outcome(circuit_breakers, &result).await;
        result
    }

    async fn do_playlist_unfollow(&self, playlist_id: &str) -> Result<(), AppError> {
        let _permit = self.rate_limiter.acquire().await;
        let url = format!("{}/playlists/{}/followers", self.config.base_url, playlist_id);
        let response = self.authed(self.http.delete(&url)).send().await.map_err(|e| service_error_from_transport(&e))?;
        classify_status(response).await?;
        Ok(())
    }

    /// `playlist_items(id, offset, limit, fields) -> page`, paginated with a max of 100 (§4.1).
    pub async fn playlist_items(
        &self,
        circuit_breakers: &CircuitBreakerService,
        playlist_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<PlaylistItemsPage, AppError> {
        guard(circuit_breakers).await?;
        let limit = limit.min(100);
        let result = retry_with_backoff(
            || self.do_playlist_items(playlist_id, offset, limit),
            &RetryConfig::default(),
            "streaming.playlist_items",
        )
        .await;
        record_outcome(circuit_breakers, &result).await;
        result
    }

    async fn do_playlist_items(&self, playlist_id: &str, offset: u32, limit: u32) -> Result<PlaylistItemsPage, AppError> {
        let _permit = self.rate_limiter.acquire().await;
        let url = format!("{}/playlists/{}/tracks", self.config.base_url, playlist_id);
        let response = self
            .authed(self.http.get(&url))
            .query(&[("offset", offset.to_string()), ("limit", limit.to_string())])
            .send()
            .await
            .map_err(|e| service_error_from_transport(&e))?;
        let response = classify_status(response).await?;
        parse_json(response).await
    }
}

async fn guard(circuit_breakers: &CircuitBreakerService) -> Result<(), AppError> {
    if !circuit_breakers.can_proceed(PROVIDER).await {
        return Err(AppError::Service(ServiceError::new(
            PROVIDER,
            ServiceErrorKind::Transient,
            "circuit breaker open",
        )));
    }
    Ok(())
}

async fn record_outcome<T>(circuit_breakers: &CircuitBreakerService, result: &Result<T, AppError>) {
    match result {
        Ok(_) => circuit_breakers.record_success(PROVIDER).await,
        Err(_) => circuit_breakers.record_failure(PROVIDER).await,
    }
}

async fn classify_status(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    match response.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::Service(ServiceError::new(
            PROVIDER,
            ServiceErrorKind::Unauthorized,
            "streaming service rejected credentials",
        ))),
        StatusCode::NOT_FOUND => {
            Err(AppError::Service(ServiceError::new(PROVIDER, ServiceErrorKind::NotFound, "not found")))
        }
        StatusCode::TOO_MANY_REQUESTS => {
            Err(AppError::Service(ServiceError::rate_limited(PROVIDER, "rate limited")))
        }
        status if status.is_server_error() => {
            Err(AppError::Service(ServiceError::transient(PROVIDER, format!("http {status}"))))
        }
        status if !status.is_success() => {
            Err(AppError::Service(ServiceError::new(PROVIDER, ServiceErrorKind::Other, format!("http {status}"))))
        }
        _ => Ok(response),
    }
}

async fn parse_json<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, AppError> {
    response.json().await.map_err(|e| {
        warn!(error = %e, "failed to parse streaming service response");
        AppError::Service(ServiceError::new(PROVIDER, ServiceErrorKind::Malformed, e.to_string()))
    })
}

fn service_error_from_transport(err: &reqwest::Error) -> AppError {
    let kind = if err.is_timeout() || err.is_connect() {
        ServiceErrorKind::Transient
    } else {
        ServiceErrorKind::Other
    };
    AppError::Service(ServiceError::new(PROVIDER, kind, err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_track_converts_release_year_from_date() {
        let raw = RawTrack {
            name: "Song".into(),
            uri: "spotify:track:abc".into(),
            external_urls: ExternalUrls { spotify: "https://open.spotify.com/track/abc".into() },
            duration_ms: 185_000,
            album: Album { release_date: "2019-03-01".into() },
            artists: vec![RawArtistRef { id: "artist-1".into() }],
        };
        let track = raw.into_track("Some Artist");
        assert_eq!(track.duration_seconds, Some(185));
        assert_eq!(track.release_year, Some(2019));
        assert_eq!(track.streaming_artist_ids, vec!["artist-1".to_string()]);
    }
}
