//! Process entrypoint (SPEC_FULL.md §10.6).
//!
//! There is no HTTP/CLI invocation surface in scope for this crate; this
//! binary loads configuration, builds `Services`, runs migrations, and
//! demonstrates the pipeline end to end against one example request for
//! manual verification, logging the outcome instead of serving it.

use niche_playlist_forge::models::request::{Language, NicheLevel, RequestParams};
use niche_playlist_forge::services::finder::NicheTrackFinder;
use niche_playlist_forge::{AppConfig, Services};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let config = AppConfig::from_env()?;
    tracing::info!(environment = ?config.environment, "starting niche-playlist-forge");

    let services = Services::build(&config).await?;
    services.db.migrate().await?;

    let demo_params = RequestParams {
        genre: "k-pop".to_string(),
        language: Language::Any,
        niche_level: NicheLevel::Moderately,
        min_release_year: 0,
        min_track_seconds: 120,
        max_track_seconds: 600,
        public: true,
    };

    let mut request = services.requests.create(Uuid::new_v4(), demo_params).await?;

    let pool = services.db.pool();
    let finder = NicheTrackFinder::new(
        &pool,
        &services.metadata,
        &services.scrobble,
        &services.streaming,
        &services.circuit_breakers,
        &services.exclusion_cache,
        &services.metrics,
        &config.pipeline,
    );

    match finder.find(&mut request).await {
        Ok(tracks) => {
            services.requests.save_stats(&request).await?;
            tracing::info!(request_id = %request.id, selected = tracks.len(), "pipeline completed");
        }
        Err(err) => {
            tracing::warn!(request_id = %request.id, error = %err, "pipeline did not produce a playlist");
        }
    }

    Ok(())
}
