//! Token-bucket rate limiter for outbound HTTP clients.
//!
//! One bucket per upstream service. Waiters queue fairly: acquisition goes
//! through an async mutex, so callers are served in FIFO order and a slow
//! refill never starves an early waiter.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Running counters for a limiter.
#[derive(Debug, Clone, Copy, Default)]
pub struct LimiterMetrics {
    pub total_requests: u64,
    pub throttled_requests: u64,
    pub total_wait: Duration,
}

impl LimiterMetrics {
    /// Mean wait per throttled request.
    pub fn avg_wait(&self) -> Duration {
        if self.throttled_requests == 0 {
            return Duration::ZERO;
        }
        self.total_wait / self.throttled_requests as u32
    }
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
    metrics: LimiterMetrics,
}

/// Async token bucket. The bucket starts full and refills at `rate`
/// tokens per second up to `capacity`.
#[derive(Debug)]
pub struct TokenBucket {
    name: &'static str,
    rate: f64,
    capacity: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a bucket with `rate` requests per second. Capacity defaults
    /// to one second's worth of tokens (minimum 1).
    pub fn new(name: &'static str, rate: f64) -> Self {
        let capacity = rate.max(1.0);
        Self {
            name,
            rate,
            capacity,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
                metrics: LimiterMetrics::default(),
            }),
        }
    }

    /// Acquire one token, waiting as long as necessary. FIFO: the mutex
    /// is held across the sleep, so later callers queue behind us.
    pub async fn acquire(&self) {
        let mut state = self.state.lock().await;
        state.metrics.total_requests += 1;
        Self::refill(&mut state, self.rate, self.capacity);

        if state.tokens < 1.0 {
            let deficit = 1.0 - state.tokens;
            let wait = Duration::from_secs_f64(deficit / self.rate);
            state.metrics.throttled_requests += 1;
            state.metrics.total_wait += wait;
            debug!(limiter = self.name, wait_ms = wait.as_millis() as u64, "rate limited");
            tokio::time::sleep(wait).await;
            Self::refill(&mut state, self.rate, self.capacity);
        }

        state.tokens -= 1.0;
    }

    /// Try to take a token without waiting.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        state.metrics.total_requests += 1;
        Self::refill(&mut state, self.rate, self.capacity);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    pub async fn metrics(&self) -> LimiterMetrics {
        self.state.lock().await.metrics
    }

    fn refill(state: &mut BucketState, rate: f64, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * rate).min(capacity);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bucket_starts_full() {
        let bucket = TokenBucket::new("test", 10.0);
        for _ in 0..10 {
            assert!(bucket.try_acquire().await);
        }
        assert!(!bucket.try_acquire().await);
    }

    #[tokio::test]
    async fn test_refill_over_time() {
        tokio::time::pause();
        let bucket = TokenBucket::new("test", 10.0);
        while bucket.try_acquire().await {}

        tokio::time::advance(Duration::from_millis(250)).await;
        // 10/s for 250ms refills ~2.5 tokens.
        assert!(bucket.try_acquire().await);
        assert!(bucket.try_acquire().await);
        assert!(!bucket.try_acquire().await);
    }

    #[tokio::test]
    async fn test_acquire_waits_when_empty() {
        tokio::time::pause();
        let bucket = TokenBucket::new("test", 1.0);
        bucket.acquire().await; // drain the single token

        let start = tokio::time::Instant::now();
        bucket.acquire().await; // auto-advance under paused time
        assert!(start.elapsed() >= Duration::from_millis(900));

        let metrics = bucket.metrics().await;
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.throttled_requests, 1);
    }

    #[tokio::test]
    async fn test_metrics_avg_wait() {
        let metrics = LimiterMetrics {
            total_requests: 4,
            throttled_requests: 2,
            total_wait: Duration::from_secs(1),
        };
        assert_eq!(metrics.avg_wait(), Duration::from_millis(500));
        assert_eq!(LimiterMetrics::default().avg_wait(), Duration::ZERO);
    }
}
