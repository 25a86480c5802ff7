//! Per-adapter rate limiting (SPEC_FULL.md §4.1/§10.4).
//!
//! Each external-service adapter owns one of these, sized to its own
//! requests/sec budget. Combines a counting `Semaphore` (bounds concurrency)
//! with a minimum-inter-request-interval guard (bounds throughput even when
//! permits free up quickly), in the idiom of the teacher's `MusicBrainzClient`.
//! Because the budget is explicitly process-local (§5), a local semaphore is
//! the whole contract -- no distributed coordination is needed.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;

pub struct AdapterRateLimiter {
    semaphore: Arc<Semaphore>,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

/// RAII guard. Its drop releases the semaphore permit -- the "guaranteed
/// release on all exit paths" contract in §4.1/§5 is just normal Rust
/// ownership here, not a manual try/finally.
pub struct RateLimitPermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl AdapterRateLimiter {
    /// `requests_per_second` sizes both the semaphore and the spacing guard.
    pub fn new(requests_per_second: f64) -> Self {
        let permits = requests_per_second.ceil().max(1.0) as usize;
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            min_interval: Duration::from_secs_f64(1.0 / requests_per_second.max(0.001)),
            last_request: Mutex::new(None),
        }
    }

    /// Acquires a permit, waiting out the minimum inter-request interval
    /// since the last acquisition if necessary.
    pub async fn acquire(&self) -> RateLimitPermit<'_> {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("rate limiter semaphore is never closed");

        let mut last_request = self.last_request.lock().await;
        if let Some(last) = *last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last_request = Some(Instant::now());

        RateLimitPermit { _permit: permit }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spaces_out_requests_to_minimum_interval() {
        let limiter = AdapterRateLimiter::new(10.0); // 100ms spacing
        let start = Instant::now();
        {
            let _p = limiter.acquire().await;
        }
        {
            let _p = limiter.acquire().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn permits_release_on_drop() {
        let limiter = AdapterRateLimiter::new(1.0);
        {
            let _p = limiter.acquire().await;
        }
        // Second acquisition must not deadlock once the first permit drops.
        let _p2 = limiter.acquire().await;
    }
}
