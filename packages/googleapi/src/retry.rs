// ABOUTME: Bounded retry with exponential backoff and a consecutive-failure circuit breaker
// ABOUTME: Retry honors Retry-After; the breaker fails fast without touching the network

use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::Rng;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Retry policy for transient provider failures (429 and 5xx).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before the given attempt (0-based), with jitter.
    ///
    /// A provider-sent Retry-After always wins over the computed backoff.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(d) = retry_after {
            return d.min(self.max_delay);
        }
        let exp = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..100));
        (exp + jitter).min(self.max_delay)
    }

    /// Whether another attempt is allowed after the given number of retries.
    pub fn should_retry(&self, retries: u32) -> bool {
        retries < self.max_retries
    }
}

#[derive(Debug)]
struct BreakerInner {
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

/// Consecutive-failure circuit breaker.
///
/// After `threshold` consecutive failures the breaker opens and `check()`
/// fails fast with [`ApiError::CircuitBreaker`] until `cooldown` has elapsed,
/// at which point a single probe request is allowed through (half-open).
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            inner: Mutex::new(BreakerInner {
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Check whether a request may proceed. Errors with
    /// [`ApiError::CircuitBreaker`] while open.
    pub fn check(&self) -> Result<(), ApiError> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        if let Some(opened_at) = inner.opened_at {
            if opened_at.elapsed() < self.cooldown {
                debug!("circuit breaker open, failing fast");
                return Err(ApiError::CircuitBreaker);
            }
            // Half-open: let one probe through; a failure re-opens.
            inner.opened_at = None;
        }
        Ok(())
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.consecutive_failures += 1;
        if inner.consecutive_failures >= self.threshold && inner.opened_at.is_none() {
            warn!(
                failures = inner.consecutive_failures,
                "circuit breaker opened"
            );
            inner.opened_at = Some(Instant::now());
        }
    }
}

/// Parse a Retry-After header value (delta-seconds form only).
pub fn parse_retry_after(value: Option<&str>) -> Option<Duration> {
    value?.trim().parse::<u64>().ok().map(Duration::from_secs)
}
