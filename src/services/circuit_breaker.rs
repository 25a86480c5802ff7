//! Circuit breaker for the three external service adapters.
//!
//! Implements a circuit breaker pattern to prevent cascading calls into an
//! adapter whose provider is down. One `CircuitBreakerService` instance is
//! shared by all three adapters (metadata/scrobble/streaming), keyed by
//! provider name, consolidating what would otherwise be three near-identical
//! implementations into one (SPEC_FULL.md §10.4).
//!
//! ## State Machine
//! - **Closed**: Normal operation, all requests pass through
//! - **Open**: Provider unavailable, requests fail immediately with a circuit-open error
//! - **HalfOpen**: Testing recovery, allows one request every `half_open_test_interval_seconds`
//!
//! ## Transitions
//! - Closed → Open: After `failure_threshold` failures within `failure_window_seconds`
//! - Open → HalfOpen: After `open_timeout_seconds`, allows one test request
//! - HalfOpen → Closed: After `half_open_success_threshold` successful requests
//! - HalfOpen → Open: On any failure

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus::{CounterVec, IntGaugeVec, Opts, Registry};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{AppError, ServiceError, ServiceErrorKind};

#[derive(Debug, Error)]
pub enum CircuitBreakerError {
    #[error("circuit breaker is open for provider '{provider}' - service temporarily unavailable")]
    CircuitOpen { provider: String },

    #[error("operation failed: {0}")]
    ExecutionFailed(#[from] anyhow::Error),
}

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub failure_window_seconds: u64,
    pub open_timeout_seconds: u64,
    pub half_open_success_threshold: u32,
    pub half_open_test_interval_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_seconds: 60,
            open_timeout_seconds: 30,
            half_open_success_threshold: 3,
            half_open_test_interval_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitBreakerStateEnum {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitBreakerStateEnum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

#[derive(Debug)]
struct CircuitState {
    state: CircuitBreakerStateEnum,
    failure_timestamps: Vec<Instant>,
    opened_at: Option<Instant>,
    last_half_open_test: Option<Instant>,
    half_open_successes: u32,
}

impl Default for CircuitState {
    fn default() -> Self {
        Self {
            state: CircuitBreakerStateEnum::Closed,
            failure_timestamps: Vec::new(),
            opened_at: None,
            last_half_open_test: None,
            half_open_successes: 0,
        }
    }
}

#[derive(Clone)]
pub struct CircuitBreakerMetrics {
    state_gauge: IntGaugeVec,
    trips_total: CounterVec,
    requests_blocked: CounterVec,
    requests_allowed: CounterVec,
}

impl CircuitBreakerMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let state_gauge = IntGaugeVec::new(
            Opts::new(
                "circuit_breaker_state",
                "Current state of circuit breaker (0=closed, 1=open, 2=half_open)",
            )
            .namespace("niche")
            .subsystem("adapter"),
            &["provider"],
        )?;

        let trips_total = CounterVec::new(
            Opts::new(
                "circuit_breaker_trips_total",
                "Total number of times circuit breaker tripped to open state",
            )
            .namespace("niche")
            .subsystem("adapter"),
            &["provider"],
        )?;

        let requests_blocked = CounterVec::new(
            Opts::new(
                "circuit_breaker_requests_blocked_total",
                "Total number of requests blocked by open circuit",
            )
            .namespace("niche")
            .subsystem("adapter"),
            &["provider"],
        )?;

        let requests_allowed = CounterVec::new(
            Opts::new(
                "circuit_breaker_requests_allowed_total",
                "Total number of requests allowed through circuit breaker",
            )
            .namespace("niche")
            .subsystem("adapter"),
            &["provider"],
        )?;

        registry.register(Box::new(state_gauge.clone()))?;
        registry.register(Box::new(trips_total.clone()))?;
        registry.register(Box::new(requests_blocked.clone()))?;
        registry.register(Box::new(requests_allowed.clone()))?;

        Ok(Self {
            state_gauge,
            trips_total,
            requests_blocked,
            requests_allowed,
        })
    }

    fn set_state(&self, provider: &str, state: CircuitBreakerStateEnum) {
        let value = match state {
            CircuitBreakerStateEnum::Closed => 0,
            CircuitBreakerStateEnum::Open => 1,
            CircuitBreakerStateEnum::HalfOpen => 2,
        };
        self.state_gauge.with_label_values(&[provider]).set(value);
    }

    fn record_trip(&self, provider: &str) {
        self.trips_total.with_label_values(&[provider]).inc();
    }

    fn record_blocked(&self, provider: &str) {
        self.requests_blocked.with_label_values(&[provider]).inc();
    }

    fn record_allowed(&self, provider: &str) {
        self.requests_allowed.with_label_values(&[provider]).inc();
    }
}

/// Shared circuit breaker service, one circuit per provider name
/// (`"metadata"`, `"scrobble"`, `"streaming"`).
pub struct CircuitBreakerService {
    config: CircuitBreakerConfig,
    circuits: Arc<RwLock<HashMap<String, CircuitState>>>,
    metrics: Option<CircuitBreakerMetrics>,
}

impl CircuitBreakerService {
    pub fn new() -> Self {
        Self {
            config: CircuitBreakerConfig::default(),
            circuits: Arc::new(RwLock::new(HashMap::new())),
            metrics: None,
        }
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuits: Arc::new(RwLock::new(HashMap::new())),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, registry: &Registry) -> Result<Self, prometheus::Error> {
        self.metrics = Some(CircuitBreakerMetrics::new(registry)?);
        Ok(self)
    }

    pub async fn get_state(&self, provider: &str) -> CircuitBreakerStateEnum {
        let circuits = self.circuits.read().await;
        circuits
            .get(provider)
            .map(|c| c.state)
            .unwrap_or(CircuitBreakerStateEnum::Closed)
    }

    pub async fn can_proceed(&self, provider: &str) -> bool {
        let mut circuits = self.circuits.write().await;
        let circuit = circuits.entry(provider.to_string()).or_default();

        let now = Instant::now();

        match circuit.state {
            CircuitBreakerStateEnum::Closed => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_allowed(provider);
                }
                true
            }
            CircuitBreakerStateEnum::Open => {
                if let Some(opened_at) = circuit.opened_at {
                    if now.duration_since(opened_at).as_secs() >= self.config.open_timeout_seconds {
                        info!(provider, "circuit breaker transitioning from Open to HalfOpen");
                        circuit.state = CircuitBreakerStateEnum::HalfOpen;
                        circuit.half_open_successes = 0;
                        circuit.last_half_open_test = Some(now);

                        if let Some(metrics) = &self.metrics {
                            metrics.set_state(provider, CircuitBreakerStateEnum::HalfOpen);
                            metrics.record_allowed(provider);
                        }
                        return true;
                    }
                }

                if let Some(metrics) = &self.metrics {
                    metrics.record_blocked(provider);
                }
                false
            }
            CircuitBreakerStateEnum::HalfOpen => {
                let should_allow = circuit.last_half_open_test.map_or(true, |last| {
                    now.duration_since(last).as_secs() >= self.config.half_open_test_interval_seconds
                });

                if should_allow {
                    circuit.last_half_open_test = Some(now);
                    if let Some(metrics) = &self.metrics {
                        metrics.record_allowed(provider);
                    }
                    true
                } else {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_blocked(provider);
                    }
                    false
                }
            }
        }
    }

    pub async fn record_success(&self, provider: &str) {
        let mut circuits = self.circuits.write().await;
        let circuit = circuits.entry(provider.to_string()).or_default();

        match circuit.state {
            CircuitBreakerStateEnum::Closed => {
                circuit.failure_timestamps.clear();
            }
            CircuitBreakerStateEnum::HalfOpen => {
                circuit.half_open_successes += 1;
                if circuit.half_open_successes >= self.config.half_open_success_threshold {
                    info!(provider, "circuit breaker transitioning from HalfOpen to Closed");
                    circuit.state = CircuitBreakerStateEnum::Closed;
                    circuit.failure_timestamps.clear();
                    circuit.opened_at = None;
                    circuit.last_half_open_test = None;
                    circuit.half_open_successes = 0;

                    if let Some(metrics) = &self.metrics {
                        metrics.set_state(provider, CircuitBreakerStateEnum::Closed);
                    }
                }
            }
            CircuitBreakerStateEnum::Open => {
                circuit.state = CircuitBreakerStateEnum::Closed;
                circuit.failure_timestamps.clear();
                circuit.opened_at = None;

                if let Some(metrics) = &self.metrics {
                    metrics.set_state(provider, CircuitBreakerStateEnum::Closed);
                }
            }
        }
    }

    pub async fn record_failure(&self, provider: &str) {
        let mut circuits = self.circuits.write().await;
        let circuit = circuits.entry(provider.to_string()).or_default();

        let now = Instant::now();

        match circuit.state {
            CircuitBreakerStateEnum::Closed => {
                circuit.failure_timestamps.push(now);

                let window = Duration::from_secs(self.config.failure_window_seconds);
                circuit.failure_timestamps.retain(|&ts| now.duration_since(ts) < window);

                if circuit.failure_timestamps.len() >= self.config.failure_threshold as usize {
                    warn!(provider, failures = circuit.failure_timestamps.len(), "circuit breaker tripping to Open");
                    circuit.state = CircuitBreakerStateEnum::Open;
                    circuit.opened_at = Some(now);

                    if let Some(metrics) = &self.metrics {
                        metrics.set_state(provider, CircuitBreakerStateEnum::Open);
                        metrics.record_trip(provider);
                    }
                }
            }
            CircuitBreakerStateEnum::HalfOpen => {
                warn!(provider, "circuit breaker transitioning from HalfOpen to Open (failed test request)");
                circuit.state = CircuitBreakerStateEnum::Open;
                circuit.opened_at = Some(now);
                circuit.half_open_successes = 0;

                if let Some(metrics) = &self.metrics {
                    metrics.set_state(provider, CircuitBreakerStateEnum::Open);
                    metrics.record_trip(provider);
                }
            }
            CircuitBreakerStateEnum::Open => {
                circuit.opened_at = Some(now);
            }
        }
    }

    /// Execute an adapter call with circuit breaker protection, returning a
    /// `ServiceError { kind: Transient }` when the circuit is open.
    pub async fn execute<F, Fut, T>(&self, provider: &str, operation: F) -> Result<T, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        if !self.can_proceed(provider).await {
            return Err(AppError::Service(ServiceError::new(
                provider,
                ServiceErrorKind::Transient,
                format!("circuit breaker open, retry after {}s", self.config.open_timeout_seconds),
            )));
        }

        match operation().await {
            Ok(result) => {
                self.record_success(provider).await;
                Ok(result)
            }
            Err(err) => {
                if Self::is_transient(&err) {
                    self.record_failure(provider).await;
                }
                Err(err)
            }
        }
    }

    fn is_transient(err: &AppError) -> bool {
        matches!(err, AppError::Service(e) if e.kind.is_retryable())
    }

    /// Execute with circuit breaker, returning `CircuitBreakerError` for callers
    /// that want to distinguish "circuit open" from "operation failed".
    pub async fn execute_with_cb_error<F, Fut, T>(
        &self,
        provider: &str,
        operation: F,
    ) -> Result<T, CircuitBreakerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if !self.can_proceed(provider).await {
            return Err(CircuitBreakerError::CircuitOpen {
                provider: provider.to_string(),
            });
        }

        match operation().await {
            Ok(result) => {
                self.record_success(provider).await;
                Ok(result)
            }
            Err(err) => {
                let err_str = err.to_string().to_lowercase();
                let is_transient = err_str.contains("timeout")
                    || err_str.contains("connection")
                    || err_str.contains("unavailable")
                    || err_str.contains("503")
                    || err_str.contains("502")
                    || err_str.contains("429")
                    || err_str.contains("rate limit");

                if is_transient {
                    self.record_failure(provider).await;
                }
                Err(CircuitBreakerError::ExecutionFailed(err))
            }
        }
    }

    pub async fn reset(&self, provider: &str) {
        let mut circuits = self.circuits.write().await;
        if let Some(circuit) = circuits.get_mut(provider) {
            info!(provider, "circuit breaker manually reset to Closed");
            circuit.state = CircuitBreakerStateEnum::Closed;
            circuit.failure_timestamps.clear();
            circuit.opened_at = None;
            circuit.last_half_open_test = None;
            circuit.half_open_successes = 0;

            if let Some(metrics) = &self.metrics {
                metrics.set_state(provider, CircuitBreakerStateEnum::Closed);
            }
        }
    }
}

impl Default for CircuitBreakerService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_closed() {
        let cb = CircuitBreakerService::new();
        assert_eq!(cb.get_state("streaming").await, CircuitBreakerStateEnum::Closed);
        assert!(cb.can_proceed("streaming").await);
    }

    #[tokio::test]
    async fn opens_after_failures() {
        let cb = CircuitBreakerService::with_config(CircuitBreakerConfig::default());
        for _ in 0..5 {
            cb.record_failure("streaming").await;
        }
        assert_eq!(cb.get_state("streaming").await, CircuitBreakerStateEnum::Open);
        assert!(!cb.can_proceed("streaming").await);
    }

    #[tokio::test]
    async fn success_clears_failures() {
        let cb = CircuitBreakerService::new();
        for _ in 0..3 {
            cb.record_failure("streaming").await;
        }
        cb.record_success("streaming").await;
        for _ in 0..3 {
            cb.record_failure("streaming").await;
        }
        assert_eq!(cb.get_state("streaming").await, CircuitBreakerStateEnum::Closed);
    }

    #[tokio::test]
    async fn half_open_success_closes() {
        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            failure_window_seconds: 60,
            open_timeout_seconds: 0,
            half_open_success_threshold: 2,
            half_open_test_interval_seconds: 0,
        };
        let cb = CircuitBreakerService::with_config(config);

        cb.record_failure("streaming").await;
        cb.record_failure("streaming").await;
        assert_eq!(cb.get_state("streaming").await, CircuitBreakerStateEnum::Open);

        assert!(cb.can_proceed("streaming").await);
        assert_eq!(cb.get_state("streaming").await, CircuitBreakerStateEnum::HalfOpen);

        cb.record_success("streaming").await;
        cb.record_success("streaming").await;
        assert_eq!(cb.get_state("streaming").await, CircuitBreakerStateEnum::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let config = CircuitBreakerConfig {
            failure_threshold: 2,
            failure_window_seconds: 60,
            open_timeout_seconds: 0,
            half_open_success_threshold: 3,
            half_open_test_interval_seconds: 0,
        };
        let cb = CircuitBreakerService::with_config(config);

        cb.record_failure("streaming").await;
        cb.record_failure("streaming").await;
        cb.can_proceed("streaming").await;
        assert_eq!(cb.get_state("streaming").await, CircuitBreakerStateEnum::HalfOpen);

        cb.record_failure("streaming").await;
        assert_eq!(cb.get_state("streaming").await, CircuitBreakerStateEnum::Open);
    }

    #[tokio::test]
    async fn independent_providers() {
        let cb = CircuitBreakerService::new();
        for _ in 0..5 {
            cb.record_failure("streaming").await;
        }
        assert_eq!(cb.get_state("streaming").await, CircuitBreakerStateEnum::Open);
        assert_eq!(cb.get_state("scrobble").await, CircuitBreakerStateEnum::Closed);
        assert!(!cb.can_proceed("streaming").await);
        assert!(cb.can_proceed("scrobble").await);
    }

    #[tokio::test]
    async fn reset_clears_state() {
        let cb = CircuitBreakerService::new();
        for _ in 0..5 {
            cb.record_failure("streaming").await;
        }
        assert_eq!(cb.get_state("streaming").await, CircuitBreakerStateEnum::Open);

        cb.reset("streaming").await;
        assert_eq!(cb.get_state("streaming").await, CircuitBreakerStateEnum::Closed);
        assert!(cb.can_proceed("streaming").await);
    }
}
