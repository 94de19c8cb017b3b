//! Strongly-typed identifiers.
//!
//! Using newtypes instead of raw strings prevents accidental mixing of
//! different identifier kinds. Event, intent, and plan ids are ULIDs:
//! 48 bits of millisecond timestamp followed by 80 bits of randomness,
//! so lexicographic order equals creation order.

use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for one event envelope.
///
/// Time-sortable: comparing two event ids as strings orders them by
/// creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Ulid);

impl EventId {
    /// Mint a fresh id stamped with the current wall clock.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Parse from the 26-character canonical ULID form.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ulid::from_string(s).map(Self)
    }

    /// Millisecond timestamp embedded in the id.
    #[must_use]
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an intent. Shares its value with the `event_id` of the
/// intent's `intent.submitted` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentId(Ulid);

impl IntentId {
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ulid::from_string(s).map(Self)
    }
}

impl From<EventId> for IntentId {
    fn from(id: EventId) -> Self {
        Self(id.0)
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an execution plan. Shares its value with the `event_id`
/// of the plan's `plan.created` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(Ulid);

impl PlanId {
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ulid::from_string(s).map(Self)
    }
}

impl From<EventId> for PlanId {
    fn from(id: EventId) -> Self {
        Self(id.0)
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Groups every envelope belonging to one intent's lifecycle.
///
/// The canonical form is `intent-<ULID>` where the ULID is the intent id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    const PREFIX: &'static str = "intent-";

    /// Build the correlation id for an intent.
    #[must_use]
    pub fn for_intent(intent_id: IntentId) -> Self {
        Self(format!("{}{intent_id}", Self::PREFIX))
    }

    /// Recover the intent id embedded in this correlation id, if any.
    #[must_use]
    pub fn intent_id(&self) -> Option<IntentId> {
        self.0
            .strip_prefix(Self::PREFIX)
            .and_then(|s| IntentId::parse(s).ok())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for CorrelationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CorrelationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transaction hash returned by a venue's `submit_tx`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_sort_by_creation_time() {
        let earlier = EventId::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let later = EventId::generate();

        assert!(earlier < later);
        assert!(earlier.to_string() < later.to_string());
    }

    #[test]
    fn correlation_id_round_trips_intent_id() {
        let intent_id = IntentId::from(EventId::generate());
        let correlation = CorrelationId::for_intent(intent_id);

        assert!(correlation.as_str().starts_with("intent-"));
        assert_eq!(correlation.intent_id(), Some(intent_id));
    }

    #[test]
    fn foreign_correlation_id_has_no_intent_id() {
        let correlation = CorrelationId::from("session-01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert_eq!(correlation.intent_id(), None);
    }
}
