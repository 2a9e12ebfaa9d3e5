//! Channel Uploader: bounded retry loop over one transport
//!
//! Each call to [`ChannelUploader::attempt_delivery`] owns its own retry
//! counter. Attempts are strictly sequential: attempt `n + 1` starts only
//! after attempt `n` has completed (or timed out) and its backoff delay has
//! elapsed.

use super::backoff::{BackoffPolicy, Sleeper, TokioSleeper};
use super::error::{AttemptError, ChannelError, ChannelKind, DeliveryOutcome};
use crate::config::RetryConfig;
use crate::types::Batch;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One transport path to the remote collector.
///
/// Implementations perform exactly one send of the already-encoded batch
/// and classify the result; retrying is the uploader's job.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn send(&self, batch: &Batch, body: Vec<u8>) -> DeliveryOutcome;
}

/// Retry budget and timing for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: BackoffPolicy,
    /// Upper bound on a single send
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig, attempt_timeout: Duration) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: BackoffPolicy::from(config),
            attempt_timeout,
        }
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

/// Successful delivery over one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelReceipt {
    pub channel: ChannelKind,
    /// Attempts used, including the one that succeeded
    pub attempts: u32,
}

/// Delivers batches over a single transport with retry and backoff.
#[derive(Clone)]
pub struct ChannelUploader {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ChannelUploader {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self::with_sleeper(transport, policy, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        transport: Arc<dyn Transport>,
        policy: RetryPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            transport,
            policy,
            sleeper,
        }
    }

    pub fn kind(&self) -> ChannelKind {
        self.transport.kind()
    }

    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver `batch`, retrying transient failures until the budget runs out.
    ///
    /// The whole batch is re-encoded and re-sent on every attempt. An encoding
    /// failure returns immediately without using up a retry.
    pub async fn attempt_delivery(&self, batch: &Batch) -> Result<ChannelReceipt, ChannelError> {
        let channel = self.kind();
        let max_attempts = self.policy.max_attempts();
        let mut attempts: u32 = 0;

        loop {
            let body = batch.to_json().map_err(|e| ChannelError::Serialization {
                channel,
                cause: e.into(),
            })?;

            let outcome = self.send_once(batch, body).await;
            attempts += 1;

            let cause = match outcome {
                Ok(()) => {
                    debug!(
                        batch_id = %batch.id(),
                        channel = %channel,
                        attempts,
                        "Batch delivered"
                    );
                    return Ok(ChannelReceipt { channel, attempts });
                }
                Err(cause) if !cause.is_retryable() => {
                    return Err(ChannelError::Serialization { channel, cause });
                }
                Err(cause) => cause,
            };

            if attempts >= max_attempts {
                warn!(
                    batch_id = %batch.id(),
                    channel = %channel,
                    attempts,
                    error = %cause,
                    "Channel retries exhausted"
                );
                return Err(ChannelError::RetriesExhausted {
                    channel,
                    attempts,
                    last: cause,
                });
            }

            let delay = self.policy.backoff.next_delay(attempts - 1);
            warn!(
                batch_id = %batch.id(),
                channel = %channel,
                attempt = attempts,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %cause,
                "Delivery attempt failed, backing off"
            );
            self.sleeper.sleep(delay).await;
        }
    }

    async fn send_once(&self, batch: &Batch, body: Vec<u8>) -> DeliveryOutcome {
        let timeout = self.policy.attempt_timeout;
        match tokio::time::timeout(timeout, self.transport.send(batch, body)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(AttemptError::Timeout(timeout)),
        }
    }
}
