//! Telemetry event type

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single telemetry event.
///
/// Serialized as `{"timestamp": "<RFC 3339>", "eventType": "...", "payload": {...}}`.
/// Fields are private so an event cannot change after it has been handed
/// to the accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    timestamp: DateTime<Utc>,
    event_type: String,
    #[serde(default)]
    payload: Map<String, Value>,
}

impl Event {
    pub fn new(
        timestamp: DateTime<Utc>,
        event_type: impl Into<String>,
        payload: Map<String, Value>,
    ) -> Self {
        Self {
            timestamp,
            event_type: event_type.into(),
            payload,
        }
    }

    /// Event stamped with the current time.
    pub fn now(event_type: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self::new(Utc::now(), event_type, payload)
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }
}
