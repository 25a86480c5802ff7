//! Music-metadata service adapter (SPEC_FULL.md §4.1, §6, C1).
//!
//! Confirms language and supplies the stable artist identifier the rest of
//! the pipeline keys on. Modeled on a MusicBrainz-shaped catalog: artists
//! have `works`, each work tagged with an ISO-639-3 language code.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::MetadataServiceConfig;
use crate::error::{AppError, ServiceError, ServiceErrorKind};
use crate::models::Language;
use crate::recovery::{retry_with_backoff, RetryConfig};
use crate::services::circuit_breaker::CircuitBreakerService;
use crate::services::rate_limiter::AdapterRateLimiter;

const PROVIDER: &str = "metadata";

#[derive(Debug, Deserialize)]
struct WorksResponse {
    works: Vec<WorkEntry>,
}

#[derive(Debug, Deserialize)]
struct WorkEntry {
    /// ISO-639-3 language code, e.g. "eng", "jpn", "kor".
    language: Option<String>,
}

pub struct MetadataServiceClient {
    http: Client,
    config: MetadataServiceConfig,
    rate_limiter: AdapterRateLimiter,
}

impl MetadataServiceClient {
    pub fn new(config: MetadataServiceConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(config.user_agent())
            .build()
            .expect("metadata HTTP client must build with valid TLS config");

        Self {
            rate_limiter: AdapterRateLimiter::new(config.requests_per_second),
            http,
            config,
        }
    }

    /// `artist_languages(metadata_id) -> map<Language, percent>`: the
    /// distribution of languages across the artist's catalog of works,
    /// filtered to entries whose percent >= 50 (§4.1). `Other` absorbs any
    /// ISO-639-3 code outside the recognized set, since the closed `Language`
    /// enum this crate tracks is only `{Any, English, Other}`.
    pub async fn artist_languages(
        &self,
        circuit_breakers: &CircuitBreakerService,
        metadata_id: &str,
    ) -> Result<HashMap<Language, f64>, AppError> {
        if !circuit_breakers.can_proceed(PROVIDER).await {
            return Err(AppError::Service(ServiceError::new(
                PROVIDER,
                ServiceErrorKind::Transient,
                "circuit breaker open",
            )));
        }

        let result = retry_with_backoff(
            || self.fetch_works(metadata_id),
            &RetryConfig::default(),
            "metadata.artist_languages",
        )
        .await;

        match &result {
            Ok(_) => circuit_breakers.record_success(PROVIDER).await,
            Err(_) => circuit_breakers.record_failure(PROVIDER).await,
        }

        let works = result?;
        let total = works.len().max(1) as f64;
        let mut counts: HashMap<Language, f64> = HashMap::new();
        for work in &works {
            let lang = classify_language(work.language.as_deref());
            *counts.entry(lang).or_insert(0.0) += 1.0;
        }

        Ok(counts
            .into_iter()
            .map(|(lang, count)| (lang, (count / total) * 100.0))
            .filter(|(_, percent)| *percent >= 50.0)
            .collect())
    }

    async fn fetch_works(&self, metadata_id: &str) -> Result<Vec<WorkEntry>, AppError> {
        let _permit = self.rate_limiter.acquire().await;

        let url = format!("{}/artist/{}/works", self.config.base_url, metadata_id);
        debug!(metadata_id, %url, "fetching artist works from metadata service");

        let response = self
            .http
            .get(&url)
            .query(&[("fmt", "json")])
            .send()
            .await
            .map_err(|e| service_error_from_transport(&e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(AppError::Service(ServiceError::new(
                PROVIDER,
                ServiceErrorKind::NotFound,
                format!("no such artist {metadata_id}"),
            ))),
            StatusCode::TOO_MANY_REQUESTS => Err(AppError::Service(ServiceError::rate_limited(
                PROVIDER,
                "metadata service rate limited this request",
            ))),
            status if status.is_server_error() => {
                Err(AppError::Service(ServiceError::transient(PROVIDER, format!("http {status}"))))
            }
            status if !status.is_success() => Err(AppError::Service(ServiceError::new(
                PROVIDER,
                ServiceErrorKind::Other,
                format!("http {status}"),
            ))),
            _ => {
                let parsed: WorksResponse = response.json().await.map_err(|e| {
                    warn!(error = %e, "failed to parse metadata service response");
                    AppError::Service(ServiceError::new(
                        PROVIDER,
                        ServiceErrorKind::Malformed,
                        format!("could not parse response: {e}"),
                    ))
                })?;
                Ok(parsed.works)
            }
        }
    }
}

fn classify_language(code: Option<&str>) -> Language {
    match code {
        Some("eng") => Language::English,
        _ => Language::Other,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_english_and_other() {
        assert_eq!(classify_language(Some("eng")), Language::English);
        assert_eq!(classify_language(Some("jpn")), Language::Other);
        assert_eq!(classify_language(None), Language::Other);
    }
}
