//! Adapter-level resilience tests (SPEC_FULL.md §7, §8 scenario 6): a
//! transient failure followed by a success should still resolve correctly
//! once retried, and the circuit breaker should trip on sustained failures.

mod common;

use niche_playlist_forge::config::MetadataServiceConfig;
use niche_playlist_forge::services::circuit_breaker::CircuitBreakerService;
use niche_playlist_forge::services::metadata_client::MetadataServiceClient;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: String) -> MetadataServiceConfig {
    MetadataServiceConfig {
        base_url,
        application_name: "NicheApp".to_string(),
        application_version: "1.0".to_string(),
        application_contact: "contact@example.org".to_string(),
        requests_per_second: 1000.0,
    }
}

#[tokio::test]
async fn retries_past_a_single_transient_failure() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/artist/mid-retry/works"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/artist/mid-retry/works"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "works": [{"language": "eng"}, {"language": "eng"}]
        })))
        .mount(&server)
        .await;

    let client = MetadataServiceClient::new(test_config(server.uri()));
    let breakers = CircuitBreakerService::new();

    let languages = client
        .artist_languages(&breakers, "mid-retry")
        .await
        .expect("should succeed after one retried transient failure");

    assert_eq!(
        languages.get(&niche_playlist_forge::models::Language::English).copied(),
        Some(100.0)
    );
}

#[tokio::test]
async fn sustained_failures_trip_the_circuit_breaker() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/artist/mid-down/works"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = MetadataServiceClient::new(test_config(server.uri()));
    let breakers = CircuitBreakerService::new();

    for _ in 0..10 {
        let _ = client.artist_languages(&breakers, "mid-down").await;
    }

    assert!(
        !breakers.can_proceed("metadata").await,
        "circuit breaker should be open after sustained transient failures"
    );
}

#[tokio::test]
async fn not_found_is_reported_without_retrying_forever() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/artist/mid-missing/works"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = MetadataServiceClient::new(test_config(server.uri()));
    let breakers = CircuitBreakerService::new();

    let err = client
        .artist_languages(&breakers, "mid-missing")
        .await
        .expect_err("404 should surface as an error, not an empty map");

    assert!(err.to_string().to_lowercase().contains("no such artist"));
}
