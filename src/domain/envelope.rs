//! The immutable event envelope.
//!
//! Wire format (JSON, camelCase):
//!
//! ```json
//! { "eventId": "<ULID>", "timestamp": "<RFC3339>", "topic": "<dotted>",
//!   "correlationId": "intent-<ULID>", "causationId": "<ULID>|null",
//!   "sequence": 1, "payload": { }, "version": 1 }
//! ```
//!
//! `sequence` is assigned by the producer when it knows the position, and
//! otherwise left empty for the state coordinator to assign on ingest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::domain::id::{CorrelationId, EventId};
use crate::domain::payload::Payload;

/// Current envelope schema version.
pub const ENVELOPE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("topic '{0}' is not in the registry")]
    InvalidTopic(String),

    #[error("payload does not match schema for topic '{topic}': {detail}")]
    PayloadSchemaMismatch { topic: String, detail: String },

    #[error("payload for topic '{topic}' failed to serialize: {detail}")]
    PayloadSerialization { topic: String, detail: String },
}

/// One immutable record of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: CorrelationId,
    /// `None` only for the root `intent.submitted` of a correlation.
    pub causation_id: Option<EventId>,
    pub sequence: Option<u64>,
    pub version: u32,
    pub payload: Payload,
}

impl EventEnvelope {
    /// Mint an envelope with a fresh id and the current wall clock.
    #[must_use]
    pub fn new(
        payload: Payload,
        correlation_id: CorrelationId,
        causation_id: Option<EventId>,
        sequence: Option<u64>,
    ) -> Self {
        Self {
            event_id: EventId::generate(),
            timestamp: Utc::now(),
            correlation_id,
            causation_id,
            sequence,
            version: ENVELOPE_VERSION,
            payload,
        }
    }

    /// Mint an envelope reusing a pre-minted event id (used by the intent
    /// manager, where `intent_id` must equal the submitted envelope's id).
    #[must_use]
    pub fn with_event_id(
        event_id: EventId,
        payload: Payload,
        correlation_id: CorrelationId,
        causation_id: Option<EventId>,
        sequence: Option<u64>,
    ) -> Self {
        Self {
            event_id,
            timestamp: Utc::now(),
            correlation_id,
            causation_id,
            sequence,
            version: ENVELOPE_VERSION,
            payload,
        }
    }

    /// The wire topic string.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.payload.topic_str()
    }

    /// Copy of this envelope with `sequence` filled in.
    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Wire {
    event_id: EventId,
    timestamp: DateTime<Utc>,
    topic: String,
    correlation_id: CorrelationId,
    #[serde(default)]
    causation_id: Option<EventId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sequence: Option<u64>,
    payload: Value,
    version: u32,
}

impl Serialize for EventEnvelope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let payload = self.payload.to_value().map_err(serde::ser::Error::custom)?;
        Wire {
            event_id: self.event_id,
            timestamp: self.timestamp,
            topic: self.payload.topic_str().to_string(),
            correlation_id: self.correlation_id.clone(),
            causation_id: self.causation_id,
            sequence: self.sequence,
            payload,
            version: self.version,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for EventEnvelope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = Wire::deserialize(deserializer)?;
        let payload =
            Payload::from_parts(&wire.topic, wire.payload).map_err(serde::de::Error::custom)?;
        Ok(Self {
            event_id: wire.event_id,
            timestamp: wire.timestamp,
            correlation_id: wire.correlation_id,
            causation_id: wire.causation_id,
            sequence: wire.sequence,
            version: wire.version,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::id::{IntentId, PlanId, TxHash};
    use crate::domain::payload::ExecCompleted;

    fn completed_envelope() -> EventEnvelope {
        let intent_id = IntentId::from(EventId::generate());
        EventEnvelope::new(
            Payload::ExecCompleted(ExecCompleted {
                plan_id: PlanId::from(EventId::generate()),
                tx_hash: TxHash::new("0xabc123"),
                amount_out: dec!(0.3267),
            }),
            CorrelationId::for_intent(intent_id),
            Some(EventId::generate()),
            Some(8),
        )
    }

    #[test]
    fn wire_format_is_camel_case() {
        let env = completed_envelope();
        let json: Value = serde_json::to_value(&env).unwrap();

        assert_eq!(json["topic"], "exec.completed");
        assert_eq!(json["version"], 1);
        assert_eq!(json["sequence"], 8);
        assert!(json["eventId"].is_string());
        assert!(json["correlationId"]
            .as_str()
            .unwrap()
            .starts_with("intent-"));
        assert_eq!(json["payload"]["amount_out"], "0.3267");
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let env = completed_envelope();
        let json = serde_json::to_string(&env).unwrap();
        let back: EventEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn missing_sequence_is_omitted_on_the_wire() {
        let mut env = completed_envelope();
        env.sequence = None;
        let json: Value = serde_json::to_value(&env).unwrap();
        assert!(json.get("sequence").is_none());
    }

    #[test]
    fn unknown_topic_envelope_survives_round_trip() {
        let json = serde_json::json!({
            "eventId": EventId::generate().to_string(),
            "timestamp": "2026-07-01T12:00:00Z",
            "topic": "market.tick",
            "correlationId": "intent-01ARZ3NDEKTSV4RRFFQ69G5FAV",
            "causationId": null,
            "sequence": 3,
            "payload": {"price": "3000.12"},
            "version": 2
        });
        let env: EventEnvelope = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(env.topic(), "market.tick");
        assert_eq!(serde_json::to_value(&env).unwrap(), json);
    }
}
