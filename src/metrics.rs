//! Prometheus metrics for the niche-playlist pipeline (SPEC_FULL.md §10.3).
//!
//! Scoped to the domain this crate actually has: adapter call volume/latency
//! per external service, pipeline outcomes, and exclusion-cache writes. There
//! is no HTTP surface, auth flow, or background job queue in this crate, so
//! those metric families from the teacher repo are not carried over.

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,

    pub adapter_requests_total: CounterVec,
    pub adapter_request_duration: HistogramVec,
    pub adapter_errors_total: CounterVec,

    pub pipeline_artists_processed_total: CounterVec,
    pub pipeline_artists_excluded_total: CounterVec,
    pub pipeline_tracks_selected_total: CounterVec,

    pub exclusion_cache_writes_total: CounterVec,
    pub exclusion_cache_hits_total: CounterVec,

    pub playlist_creation_duration: HistogramVec,
}

impl MetricsCollector {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Arc::new(Registry::new());

        let adapter_requests_total = CounterVec::new(
            Opts::new("adapter_requests_total", "Total calls made to an external service adapter")
                .namespace("niche")
                .subsystem("adapter"),
            &["provider", "operation"],
        )?;

        let adapter_request_duration = HistogramVec::new(
            HistogramOpts::new("adapter_request_duration_seconds", "Adapter call latency in seconds")
                .namespace("niche")
                .subsystem("adapter")
                .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 15.0, 30.0]),
            &["provider", "operation"],
        )?;

        let adapter_errors_total = CounterVec::new(
            Opts::new("adapter_errors_total", "Adapter calls that returned a ServiceError")
                .namespace("niche")
                .subsystem("adapter"),
            &["provider", "kind"],
        )?;

        let pipeline_artists_processed_total = CounterVec::new(
            Opts::new("artists_processed_total", "Artists considered by the finder pipeline")
                .namespace("niche")
                .subsystem("pipeline"),
            &["genre"],
        )?;

        let pipeline_artists_excluded_total = CounterVec::new(
            Opts::new("artists_excluded_total", "Artists excluded by the validator, by reason")
                .namespace("niche")
                .subsystem("pipeline"),
            &["genre", "reason"],
        )?;

        let pipeline_tracks_selected_total = CounterVec::new(
            Opts::new("tracks_selected_total", "Tracks accepted into a generated playlist")
                .namespace("niche")
                .subsystem("pipeline"),
            &["genre", "source"],
        )?;

        let exclusion_cache_writes_total = CounterVec::new(
            Opts::new("writes_total", "Upserts into the exclusion cache")
                .namespace("niche")
                .subsystem("exclusion_cache"),
            &["genre", "reason"],
        )?;

        let exclusion_cache_hits_total = CounterVec::new(
            Opts::new("hits_total", "Artists short-circuited by a fresh cached exclusion")
                .namespace("niche")
                .subsystem("exclusion_cache"),
            &["genre"],
        )?;

        let playlist_creation_duration = HistogramVec::new(
            HistogramOpts::new("creation_duration_seconds", "Time to materialize a playlist on the streaming service")
                .namespace("niche")
                .subsystem("playlist")
                .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0]),
            &["genre"],
        )?;

        registry.register(Box::new(adapter_requests_total.clone()))?;
        registry.register(Box::new(adapter_request_duration.clone()))?;
        registry.register(Box::new(adapter_errors_total.clone()))?;
        registry.register(Box::new(pipeline_artists_processed_total.clone()))?;
        registry.register(Box::new(pipeline_artists_excluded_total.clone()))?;
        registry.register(Box::new(pipeline_tracks_selected_total.clone()))?;
        registry.register(Box::new(exclusion_cache_writes_total.clone()))?;
        registry.register(Box::new(exclusion_cache_hits_total.clone()))?;
        registry.register(Box::new(playlist_creation_duration.clone()))?;

        Ok(Self {
            registry,
            adapter_requests_total,
            adapter_request_duration,
            adapter_errors_total,
            pipeline_artists_processed_total,
            pipeline_artists_excluded_total,
            pipeline_tracks_selected_total,
            exclusion_cache_writes_total,
            exclusion_cache_hits_total,
            playlist_creation_duration,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Render the current metric snapshot in Prometheus text-exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_without_error() {
        let collector = MetricsCollector::new().expect("metrics should register");
        collector
            .adapter_requests_total
            .with_label_values(&["metadata", "artist_languages"])
            .inc();
        let rendered = collector.render().unwrap();
        assert!(rendered.contains("niche_adapter_requests_total"));
    }
}
