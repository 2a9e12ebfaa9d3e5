//! Delivery error types, from a single attempt up to the terminal failure

use crate::storage::StoreError;
use crate::types::BatchCodecError;
use std::time::Duration;

/// Which transport a channel uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Collector HTTP API
    Primary,
    /// Object-storage bucket
    Secondary,
}

impl ChannelKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            ChannelKind::Primary => "primary",
            ChannelKind::Secondary => "secondary",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single delivery attempt failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),
    #[error("channel responded with status {status}")]
    Response { status: u16 },
}

impl AttemptError {
    /// Transport, timeout, and response failures are retried; a batch that
    /// cannot be encoded will not encode on the next attempt either.
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, AttemptError::Serialization(_))
    }
}

impl From<BatchCodecError> for AttemptError {
    fn from(e: BatchCodecError) -> Self {
        AttemptError::Serialization(e.to_string())
    }
}

/// Result of one delivery attempt.
pub type DeliveryOutcome = Result<(), AttemptError>;

/// A channel gave up on a batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelError {
    #[error("{channel} channel could not serialize batch: {cause}")]
    Serialization { channel: ChannelKind, cause: AttemptError },
    #[error("{channel} channel exhausted after {attempts} attempts: {last}")]
    RetriesExhausted {
        channel: ChannelKind,
        attempts: u32,
        last: AttemptError,
    },
}

impl ChannelError {
    pub const fn channel(&self) -> ChannelKind {
        match self {
            ChannelError::Serialization { channel, .. }
            | ChannelError::RetriesExhausted { channel, .. } => *channel,
        }
    }

    /// The last attempt-level cause seen by the channel.
    pub const fn cause(&self) -> &AttemptError {
        match self {
            ChannelError::Serialization { cause, .. } => cause,
            ChannelError::RetriesExhausted { last, .. } => last,
        }
    }
}

/// Both channels failed for the same batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("all channels failed (primary: {primary}; secondary: {secondary})")]
pub struct CombinedChannelFailure {
    pub primary: ChannelError,
    pub secondary: ChannelError,
}

/// Terminal delivery failures surfaced by the coordinator.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The batch could not be encoded; no channel or local file can take it.
    #[error("batch could not be serialized: {0}")]
    Serialization(ChannelError),
    /// Both channels failed and the local fallback write failed too.
    #[error("{channels}; local fallback failed: {source}")]
    Persistence {
        channels: CombinedChannelFailure,
        #[source]
        source: StoreError,
    },
}
