//! Retry backoff policy and the suspension primitive used between attempts

use crate::config::RetryConfig;
use async_trait::async_trait;
use std::time::Duration;

/// Exponential backoff: `min(base * 2^n, cap)` for retry index `n`.
///
/// Jitter is off by default so retry timing is deterministic. When
/// enabled, a uniform `[0, jitter)` delay is added and the sum is still
/// capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    cap: Duration,
    jitter: Duration,
}

impl BackoffPolicy {
    pub const fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            jitter: Duration::ZERO,
        }
    }

    #[must_use]
    pub const fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub const fn base(&self) -> Duration {
        self.base
    }

    pub const fn cap(&self) -> Duration {
        self.cap
    }

    /// Deterministic delay before retry `n + 1`, after attempt `n` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// `delay_for` plus jitter, if any.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay_for(attempt);
        if self.jitter.is_zero() {
            return delay;
        }
        use rand::Rng;
        let extra = rand::thread_rng().gen_range(Duration::ZERO..self.jitter);
        (delay + extra).min(self.cap)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for BackoffPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.base_delay(), config.max_delay()).with_jitter(config.jitter())
    }
}

/// Suspends the current delivery task for a backoff delay.
///
/// Injected into channel uploaders so tests can observe delays without
/// waiting on a real clock.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}
