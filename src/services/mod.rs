//! Service adapters and pipeline components (SPEC_FULL.md §9, §10.6).
//!
//! `Services` is the dependency-injection bag built once at process init and
//! passed by reference into the finder, validator, and adapters -- no global
//! singleton, per §9's design note.

pub mod circuit_breaker;
pub mod exclusion_cache;
pub mod finder;
pub mod metadata_client;
pub mod playlist_service;
pub mod rate_limiter;
pub mod request_service;
pub mod scrobble_client;
pub mod streaming_client;
pub mod validator;

use sqlx::PgPool;

use crate::config::AppConfig;
use crate::database::Database;
use crate::metrics::MetricsCollector;
use crate::models::genre::GenreCatalog;
use circuit_breaker::CircuitBreakerService;
use exclusion_cache::ExclusionCacheService;
use metadata_client::MetadataServiceClient;
use request_service::RequestService;
use scrobble_client::ScrobbleServiceClient;
use streaming_client::StreamingServiceClient;

/// Everything the pipeline needs, constructed once in `main.rs`/library init
/// and threaded through by reference (§9, §10.6).
pub struct Services {
    pub db: Database,
    pub metadata: MetadataServiceClient,
    pub scrobble: ScrobbleServiceClient,
    pub streaming: StreamingServiceClient,
    pub circuit_breakers: CircuitBreakerService,
    pub genre_catalog: &'static GenreCatalog,
    pub metrics: MetricsCollector,
    pub exclusion_cache: ExclusionCacheService,
    pub requests: RequestService,
}

impl Services {
    pub async fn build(config: &AppConfig) -> anyhow::Result<Self> {
        let db = Database::new(&config.database.url).await?;
        let pool: PgPool = db.pool();

        Ok(Self {
            metadata: MetadataServiceClient::new(config.metadata_service.clone()),
            scrobble: ScrobbleServiceClient::new(config.scrobble_service.clone()),
            streaming: StreamingServiceClient::new(config.streaming_service.clone()),
            circuit_breakers: CircuitBreakerService::new(),
            genre_catalog: GenreCatalog::global(),
            metrics: MetricsCollector::new()?,
            exclusion_cache: ExclusionCacheService::new(pool.clone(), config.pipeline.exclusion_freshness_days),
            requests: RequestService::new(pool),
            db,
        })
    }
}
