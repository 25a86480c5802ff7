//! Scrobble (listener-statistics) service adapter (SPEC_FULL.md §4.1, §6, C1).
//!
//! Modeled on a Last.fm-shaped API: `artist.getInfo` / `artist.getTopTracks`,
//! both addressable by either `mbid` (metadata id) or `artist` name, with the
//! fallback discipline specified in §4.1: try the id, then fall back to name.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ScrobbleServiceConfig;
use crate::error::{AppError, ServiceError, ServiceErrorKind};
use crate::models::Track;
use crate::recovery::{retry_with_backoff, RetryConfig};
use crate::services::circuit_breaker::CircuitBreakerService;
use crate::services::rate_limiter::AdapterRateLimiter;

const PROVIDER: &str = "scrobble";

#[derive(Debug, Clone)]
pub struct ScrobbleArtistInfo {
    pub listeners: i64,
    pub playcount: i64,
    pub tags: Vec<String>,
    pub biography: String,
}

#[derive(Debug, Deserialize)]
struct ArtistInfoResponse {
    artist: ArtistInfoBody,
}

#[derive(Debug, Deserialize)]
struct ArtistInfoBody {
    stats: ArtistStats,
    #[serde(default)]
    tags: TagList,
    #[serde(default)]
    bio: Bio,
}

#[derive(Debug, Deserialize)]
struct ArtistStats {
    #[serde(deserialize_with = "deserialize_stringly_int")]
    listeners: i64,
    #[serde(deserialize_with = "deserialize_stringly_int")]
    playcount: i64,
}

#[derive(Debug, Deserialize, Default)]
struct TagList {
    #[serde(default)]
    tag: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize, Default)]
struct Bio {
    #[serde(default)]
    summary: String,
}

#[derive(Debug, Deserialize)]
struct TopTracksResponse {
    toptracks: TopTracksBody,
}

#[derive(Debug, Deserialize)]
struct TopTracksBody {
    #[serde(default)]
    track: Vec<TopTrackEntry>,
}

#[derive(Debug, Deserialize)]
struct TopTrackEntry {
    name: String,
}

/// A by-metadata-id-or-name lookup key, per the fallback discipline in §4.1.
pub enum ArtistRef<'a> {
    MetadataId(&'a str),
    Name(&'a str),
}

pub struct ScrobbleServiceClient {
    http: Client,
    config: ScrobbleServiceConfig,
    rate_limiter: AdapterRateLimiter,
}

impl ScrobbleServiceClient {
    pub fn new(config: ScrobbleServiceConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("scrobble HTTP client must build with valid TLS config");

        Self {
            rate_limiter: AdapterRateLimiter::new(config.requests_per_second),
            http,
            config,
        }
    }

    /// `artist_info(metadata_id, name) -> { listeners, playcount, tags, biography }`.
    /// Tries `metadata_id` first; on a not-found miss, falls back to `name`.
    pub async fn artist_info(
        &self,
        circuit_breakers: &CircuitBreakerService,
        metadata_id: &str,
        name: &str,
    ) -> Result<ScrobbleArtistInfo, AppError> {
        if !circuit_breakers.can_proceed(PROVIDER).await {
            return Err(circuit_open_error());
        }

        let by_id = retry_with_backoff(
            || self.fetch_artist_info(&ArtistRef::MetadataId(metadata_id)),
            &RetryConfig::default(),
            "scrobble.artist_info",
        )
        .await;

        let result = match by_id {
            Err(AppError::Service(ref e)) if e.kind == ServiceErrorKind::NotFound => {
                retry_with_backoff(
                    || self.fetch_artist_info(&ArtistRef::Name(name)),
                    &RetryConfig::default(),
                    "scrobble.artist_info",
                )
                .await
            }
            other => other,
        };

        record_outcome(circuit_breakers, &result).await;
        result
    }

    async fn fetch_artist_info(&self, artist_ref: &ArtistRef<'_>) -> Result<ScrobbleArtistInfo, AppError> {
        let _permit = self.rate_limiter.acquire().await;

        let mut params = vec![
            ("method", "artist.getInfo".to_string()),
            ("api_key", self.config.api_key.clone()),
            ("format", "json".to_string()),
        ];
        match artist_ref {
            ArtistRef::MetadataId(id) => params.push(("mbid", id.to_string())),
            ArtistRef::Name(name) => params.push(("artist", name.to_string())),
        }

        debug!(base_url = %self.config.base_url, "fetching artist info from scrobble service");
        let response = self
            .http
            .get(&self.config.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| service_error_from_transport(&e))?;

        let response = classify_status(response).await?;
        let parsed: ArtistInfoResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "failed to parse scrobble artist info response");
            AppError::Service(ServiceError::new(PROVIDER, ServiceErrorKind::Malformed, e.to_string()))
        })?;

        Ok(ScrobbleArtistInfo {
            listeners: parsed.artist.stats.listeners,
            playcount: parsed.artist.stats.playcount,
            tags: parsed.artist.tags.tag.into_iter().map(|t| t.name).collect(),
            biography: parsed.artist.bio.summary,
        })
    }

    /// `artist_top_tracks(metadata_id, name, limit) -> [Track]`, same
    /// fallback discipline as `artist_info`.
    pub async fn artist_top_tracks(
        &self,
        circuit_breakers: &CircuitBreakerService,
        metadata_id: &str,
        artist_name: &str,
        limit: u32,
    ) -> Result<Vec<Track>, AppError> {
        if !circuit_breakers.can_proceed(PROVIDER).await {
            return Err(circuit_open_error());
        }

        let by_id = retry_with_backoff(
            || self.fetch_top_tracks(&ArtistRef::MetadataId(metadata_id), limit),
            &RetryConfig::default(),
            "scrobble.artist_top_tracks",
        )
        .await;

        let result = match by_id {
            Err(AppError::Service(ref e)) if e.kind == ServiceErrorKind::NotFound => {
                retry_with_backoff(
                    || self.fetch_top_tracks(&ArtistRef::Name(artist_name), limit),
                    &RetryConfig::default(),
                    "scrobble.artist_top_tracks",
                )
                .await
            }
            other => other,
        };

        record_outcome(circuit_breakers, &result).await;
        let names = result?;
        Ok(names.into_iter().map(|name| Track::new(name, artist_name)).collect())
    }

    async fn fetch_top_tracks(&self, artist_ref: &ArtistRef<'_>, limit: u32) -> Result<Vec<String>, AppError> {
        let _permit = self.rate_limiter.acquire().await;

        let mut params = vec![
            ("method", "artist.getTopTracks".to_string()),
            ("api_key", self.config.api_key.clone()),
            ("format", "json".to_string()),
            ("limit", limit.to_string()),
        ];
        match artist_ref {
            ArtistRef::MetadataId(id) => params.push(("mbid", id.to_string())),
            ArtistRef::Name(name) => params.push(("artist", name.to_string())),
        }

        let response = self
            .http
            .get(&self.config.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| service_error_from_transport(&e))?;

        let response = classify_status(response).await?;
        let parsed: TopTracksResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "failed to parse scrobble top-tracks response");
            AppError::Service(ServiceError::new(PROVIDER, ServiceErrorKind::Malformed, e.to_string()))
        })?;

        Ok(parsed.toptracks.track.into_iter().map(|t| t.name).collect())
    }
}

async fn record_outcome<T>(circuit_breakers: &CircuitBreakerService, result: &Result<T, AppError>) {
    match result {
        Ok(_) => circuit_breakers.record_success(PROVIDER).await,
        Err(_) => circuit_breakers.record_failure(PROVIDER).await,
    }
}

fn circuit_open_error() -> AppError {
    AppError::Service(ServiceError::new(PROVIDER, ServiceErrorKind::Transient, "circuit breaker open"))
}

async fn classify_status(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    match response.status() {
        StatusCode::NOT_FOUND => Err(AppError::Service(ServiceError::new(
            PROVIDER,
            ServiceErrorKind::NotFound,
            "artist not found",
        ))),
        StatusCode::TOO_MANY_REQUESTS => {
            Err(AppError::Service(ServiceError::rate_limited(PROVIDER, "rate limited")))
        }
        status if status.is_server_error() => {
            Err(AppError::Service(ServiceError::transient(PROVIDER, format!("http {status}"))))
        }
        status if !status.is_success() => Err(AppError::Service(ServiceError::new(
            PROVIDER,
            ServiceErrorKind::Other,
            format!("http {status}"),
        ))),
        _ => Ok(response),
    }
}

fn service_error_from_transport(err: &reqwest::Error) -> AppError {
    let kind = if err.is_timeout() || err.is_connect() {
        ServiceErrorKind::Transient
    } else {
        ServiceErrorKind::Other
    };
    AppError::Service(ServiceError::new(PROVIDER, kind, err.to_string()))
}

/// Deserializes Last.fm-shaped stats, which arrive as JSON strings ("1234"),
/// into integers.
fn deserialize_stringly_int<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.parse().map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artist_ref_variants_construct() {
        let by_id = ArtistRef::MetadataId("mid-1");
        let by_name = ArtistRef::Name("Some Artist");
        assert!(matches!(by_id, ArtistRef::MetadataId(_)));
        assert!(matches!(by_name, ArtistRef::Name(_)));
    }
}
