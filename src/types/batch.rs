//! Sealed event batches and their JSON codec

use super::Event;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Batch encode/decode errors
#[derive(Debug, thiserror::Error)]
#[error("batch serialization error: {0}")]
pub struct BatchCodecError(#[from] serde_json::Error);

/// An immutable, ordered group of events delivered as one unit.
///
/// Events sit behind an `Arc`, so cloning a batch for a retry or a
/// fallback channel never copies or reorders them. The `id` and
/// `sealed_at` fields are local bookkeeping; the wire form is just the
/// JSON array of events.
#[derive(Debug, Clone)]
pub struct Batch {
    id: Uuid,
    sealed_at: DateTime<Utc>,
    events: Arc<[Event]>,
}

impl Batch {
    /// Seal a buffer of events into a batch.
    pub fn seal(events: Vec<Event>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sealed_at: Utc::now(),
            events: events.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn sealed_at(&self) -> DateTime<Utc> {
        self.sealed_at
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Encode as a JSON array of event objects.
    pub fn to_json(&self) -> Result<Vec<u8>, BatchCodecError> {
        Ok(serde_json::to_vec(&*self.events)?)
    }

    /// Decode a JSON array of event objects into a freshly sealed batch.
    pub fn from_json(bytes: &[u8]) -> Result<Self, BatchCodecError> {
        let events: Vec<Event> = serde_json::from_slice(bytes)?;
        Ok(Self::seal(events))
    }
}

impl PartialEq for Batch {
    /// Two batches are equal when they carry the same events in the same order.
    fn eq(&self, other: &Self) -> bool {
        self.events == other.events
    }
}
