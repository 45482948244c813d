//! Configuration for the sync engine.

use rand::Rng;
use std::time::Duration;

/// Configuration for a sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Quiet period after the last edit before it is queued for upload.
    pub debounce: Duration,
    /// Maximum number of pending operations; the oldest are dropped first.
    pub queue_capacity: usize,
    /// Retry configuration.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration with the default debounce and queue size.
    pub fn new() -> Self {
        Self {
            debounce: Duration::from_millis(1200),
            queue_capacity: 100,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Sets the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Exponential backoff with additive jitter.
///
/// The delay before attempt `n` (counted after the failure, so the first
/// retry is attempt 1) is
/// `min(max_delay, 2^max(1, n) * base_delay + U[0, jitter])`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Unit of the exponential term.
    pub base_delay: Duration,
    /// Upper bound for any delay.
    pub max_delay: Duration,
    /// Upper bound of the uniform jitter.
    pub jitter: Duration,
}

impl RetryConfig {
    /// Creates the default schedule: 1 s base, 60 s cap, 500 ms jitter.
    pub fn new() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(60),
            jitter: Duration::from_millis(500),
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the jitter bound.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculates the delay for `attempt` with random jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.delay_with_jitter(attempt, jitter)
    }

    /// Calculates the delay for `attempt` with an explicit jitter value.
    pub fn delay_with_jitter(&self, attempt: u32, jitter_ms: u64) -> Duration {
        let exponent = attempt.max(1);
        let base_ms = self.base_delay.as_millis() as u64;
        let backoff = 2u64
            .checked_pow(exponent)
            .and_then(|factor| factor.checked_mul(base_ms))
            .unwrap_or(u64::MAX);
        let total = backoff.saturating_add(jitter_ms);
        Duration::from_millis(total).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new()
    }
}
