//! The fixed topic registry and subscription patterns.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Every topic a producer inside the core may emit.
///
/// The registry is closed: envelopes carrying a topic outside this set are
/// stored verbatim for forward compatibility but never projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Topic {
    #[serde(rename = "intent.submitted")]
    IntentSubmitted,
    #[serde(rename = "intent.accepted")]
    IntentAccepted,
    #[serde(rename = "intent.failed")]
    IntentFailed,
    #[serde(rename = "risk.approved")]
    RiskApproved,
    #[serde(rename = "risk.rejected")]
    RiskRejected,
    #[serde(rename = "plan.created")]
    PlanCreated,
    #[serde(rename = "plan.rejected")]
    PlanRejected,
    #[serde(rename = "exec.started")]
    ExecStarted,
    #[serde(rename = "exec.step_submitted")]
    ExecStepSubmitted,
    #[serde(rename = "exec.step_filled")]
    ExecStepFilled,
    #[serde(rename = "exec.completed")]
    ExecCompleted,
    #[serde(rename = "exec.failed")]
    ExecFailed,
}

/// Coarse grouping used for the gateway's drop policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicClass {
    Intent,
    Risk,
    Plan,
    Exec,
    /// Topics outside the registry (e.g. `market.*` ticks from a newer
    /// writer). The only class the gateway is allowed to shed.
    Foreign,
}

impl TopicClass {
    /// Classify an arbitrary topic string, registered or not.
    #[must_use]
    pub fn of(topic: &str) -> Self {
        match topic.split('.').next() {
            Some("intent") => Self::Intent,
            Some("risk") => Self::Risk,
            Some("plan") => Self::Plan,
            Some("exec") => Self::Exec,
            _ => Self::Foreign,
        }
    }

    /// True when the gateway may drop the oldest queued message of this
    /// class under backpressure instead of disconnecting the client.
    #[must_use]
    pub const fn droppable(self) -> bool {
        matches!(self, Self::Foreign)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    #[error("unknown topic '{0}'")]
    InvalidTopic(String),

    #[error("invalid pattern '{0}': segments must be lowercase, '*' only as trailing segment")]
    InvalidPattern(String),
}

impl Topic {
    pub const ALL: [Topic; 12] = [
        Topic::IntentSubmitted,
        Topic::IntentAccepted,
        Topic::IntentFailed,
        Topic::RiskApproved,
        Topic::RiskRejected,
        Topic::PlanCreated,
        Topic::PlanRejected,
        Topic::ExecStarted,
        Topic::ExecStepSubmitted,
        Topic::ExecStepFilled,
        Topic::ExecCompleted,
        Topic::ExecFailed,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Topic::IntentSubmitted => "intent.submitted",
            Topic::IntentAccepted => "intent.accepted",
            Topic::IntentFailed => "intent.failed",
            Topic::RiskApproved => "risk.approved",
            Topic::RiskRejected => "risk.rejected",
            Topic::PlanCreated => "plan.created",
            Topic::PlanRejected => "plan.rejected",
            Topic::ExecStarted => "exec.started",
            Topic::ExecStepSubmitted => "exec.step_submitted",
            Topic::ExecStepFilled => "exec.step_filled",
            Topic::ExecCompleted => "exec.completed",
            Topic::ExecFailed => "exec.failed",
        }
    }

    /// Look a topic up in the registry.
    pub fn parse(s: &str) -> Result<Self, TopicError> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TopicError::InvalidTopic(s.to_string()))
    }

    #[must_use]
    pub fn class(self) -> TopicClass {
        TopicClass::of(self.as_str())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A dot-notation subscription pattern with an optional trailing `*`.
///
/// `intent.*` matches `intent.submitted` and `intent.accepted`;
/// `plan.created` matches only itself. Wildcards are only valid as the
/// final segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pattern(String);

impl Pattern {
    /// Validate and construct a pattern.
    pub fn parse(s: &str) -> Result<Self, TopicError> {
        let segments: Vec<&str> = s.split('.').collect();
        if segments.is_empty() || segments.iter().any(|seg| seg.is_empty()) {
            return Err(TopicError::InvalidPattern(s.to_string()));
        }
        for (i, seg) in segments.iter().enumerate() {
            let last = i == segments.len() - 1;
            if *seg == "*" {
                if !last {
                    return Err(TopicError::InvalidPattern(s.to_string()));
                }
                continue;
            }
            if !seg
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
            {
                return Err(TopicError::InvalidPattern(s.to_string()));
            }
        }
        Ok(Self(s.to_string()))
    }

    /// Exact-match pattern for one registered topic.
    #[must_use]
    pub fn exact(topic: Topic) -> Self {
        Self(topic.as_str().to_string())
    }

    /// Whether this pattern matches the given topic string.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        match self.0.strip_suffix('*') {
            Some(prefix) => topic.starts_with(prefix),
            None => self.0 == topic,
        }
    }

    /// Whether any registered topic matches this pattern.
    #[must_use]
    pub fn matches_registry(&self) -> bool {
        Topic::ALL.iter().any(|t| self.matches(t.as_str()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trips() {
        for topic in Topic::ALL {
            assert_eq!(Topic::parse(topic.as_str()), Ok(topic));
        }
    }

    #[test]
    fn unknown_topic_is_rejected() {
        assert!(matches!(
            Topic::parse("market.tick"),
            Err(TopicError::InvalidTopic(_))
        ));
    }

    #[test]
    fn wildcard_matches_class() {
        let pattern = Pattern::parse("intent.*").unwrap();
        assert!(pattern.matches("intent.submitted"));
        assert!(pattern.matches("intent.accepted"));
        assert!(!pattern.matches("risk.approved"));
    }

    #[test]
    fn exact_pattern_matches_only_itself() {
        let pattern = Pattern::parse("plan.created").unwrap();
        assert!(pattern.matches("plan.created"));
        assert!(!pattern.matches("plan.rejected"));
    }

    #[test]
    fn interior_wildcard_is_invalid() {
        assert!(Pattern::parse("intent.*.submitted").is_err());
        assert!(Pattern::parse("").is_err());
        assert!(Pattern::parse("Intent.*").is_err());
    }

    #[test]
    fn foreign_topics_are_droppable() {
        assert!(TopicClass::of("market.tick").droppable());
        assert!(!TopicClass::of("exec.completed").droppable());
        assert!(!TopicClass::of("intent.submitted").droppable());
    }
}
