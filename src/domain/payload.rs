//! Topic-keyed event payloads.
//!
//! [`Payload`] is a tagged union: every registered topic has exactly one
//! payload shape, so an envelope carrying a typed payload is valid
//! against the registry by construction. Topics from a newer writer are
//! preserved verbatim in [`Payload::Unknown`] and skipped by the
//! projector.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::envelope::EnvelopeError;
use crate::domain::id::{IntentId, PlanId, TxHash};
use crate::domain::intent::Intent;
use crate::domain::plan::ExecutionPlan;
use crate::domain::topic::Topic;

/// Machine-readable reason carried by rejection and failure events and
/// surfaced on the intent read model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    NotionalLimit,
    SlippageLimit,
    WindowOutOfRange,
    UnsupportedVenue,
    NoRoute,
    RouteTimeout,
    RouteInternal,
    Reverted,
    DeadlineExceeded,
    MaxAttemptsExceeded,
    AcceptPublishFailed,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotionalLimit => "NOTIONAL_LIMIT",
            Self::SlippageLimit => "SLIPPAGE_LIMIT",
            Self::WindowOutOfRange => "WINDOW_OUT_OF_RANGE",
            Self::UnsupportedVenue => "UNSUPPORTED_VENUE",
            Self::NoRoute => "NO_ROUTE",
            Self::RouteTimeout => "ROUTE_TIMEOUT",
            Self::RouteInternal => "ROUTE_INTERNAL",
            Self::Reverted => "REVERTED",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::MaxAttemptsExceeded => "MAX_ATTEMPTS_EXCEEDED",
            Self::AcceptPublishFailed => "ACCEPT_PUBLISH_FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskApproved {
    pub intent_id: IntentId,
    /// USD notional the gate evaluated, recorded for audit.
    pub notional_usd: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskRejected {
    pub intent_id: IntentId,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAccepted {
    pub intent_id: IntentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentFailed {
    pub intent_id: IntentId,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRejected {
    pub intent_id: IntentId,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecStarted {
    pub plan_id: PlanId,
    pub intent_id: IntentId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecStepSubmitted {
    pub plan_id: PlanId,
    /// 1-based submission attempt for this plan.
    pub attempt: u32,
    pub tx_hash: TxHash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecStepFilled {
    pub plan_id: PlanId,
    pub tx_hash: TxHash,
    pub amount_out: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecCompleted {
    pub plan_id: PlanId,
    pub tx_hash: TxHash,
    pub amount_out: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecFailed {
    pub plan_id: PlanId,
    pub reason: FailureReason,
}

/// One domain event, keyed by topic.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    IntentSubmitted(Intent),
    IntentAccepted(IntentAccepted),
    IntentFailed(IntentFailed),
    RiskApproved(RiskApproved),
    RiskRejected(RiskRejected),
    PlanCreated(ExecutionPlan),
    PlanRejected(PlanRejected),
    ExecStarted(ExecStarted),
    ExecStepSubmitted(ExecStepSubmitted),
    ExecStepFilled(ExecStepFilled),
    ExecCompleted(ExecCompleted),
    ExecFailed(ExecFailed),
    /// A topic outside the registry, preserved verbatim.
    Unknown { topic: String, value: Value },
}

impl Payload {
    /// The registered topic of this payload, if it has one.
    #[must_use]
    pub fn topic(&self) -> Option<Topic> {
        match self {
            Self::IntentSubmitted(_) => Some(Topic::IntentSubmitted),
            Self::IntentAccepted(_) => Some(Topic::IntentAccepted),
            Self::IntentFailed(_) => Some(Topic::IntentFailed),
            Self::RiskApproved(_) => Some(Topic::RiskApproved),
            Self::RiskRejected(_) => Some(Topic::RiskRejected),
            Self::PlanCreated(_) => Some(Topic::PlanCreated),
            Self::PlanRejected(_) => Some(Topic::PlanRejected),
            Self::ExecStarted(_) => Some(Topic::ExecStarted),
            Self::ExecStepSubmitted(_) => Some(Topic::ExecStepSubmitted),
            Self::ExecStepFilled(_) => Some(Topic::ExecStepFilled),
            Self::ExecCompleted(_) => Some(Topic::ExecCompleted),
            Self::ExecFailed(_) => Some(Topic::ExecFailed),
            Self::Unknown { .. } => None,
        }
    }

    /// The topic string that goes on the wire.
    #[must_use]
    pub fn topic_str(&self) -> &str {
        match self {
            Self::Unknown { topic, .. } => topic,
            other => other
                .topic()
                .map(Topic::as_str)
                .unwrap_or_default(),
        }
    }

    /// Serialize to the wire `payload` object.
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        match self {
            Self::IntentSubmitted(p) => serde_json::to_value(p),
            Self::IntentAccepted(p) => serde_json::to_value(p),
            Self::IntentFailed(p) => serde_json::to_value(p),
            Self::RiskApproved(p) => serde_json::to_value(p),
            Self::RiskRejected(p) => serde_json::to_value(p),
            Self::PlanCreated(p) => serde_json::to_value(p),
            Self::PlanRejected(p) => serde_json::to_value(p),
            Self::ExecStarted(p) => serde_json::to_value(p),
            Self::ExecStepSubmitted(p) => serde_json::to_value(p),
            Self::ExecStepFilled(p) => serde_json::to_value(p),
            Self::ExecCompleted(p) => serde_json::to_value(p),
            Self::ExecFailed(p) => serde_json::to_value(p),
            Self::Unknown { value, .. } => Ok(value.clone()),
        }
    }

    /// Reconstruct from the wire `topic` + `payload` fields.
    ///
    /// Topics outside the registry become [`Payload::Unknown`]; a
    /// registered topic whose payload does not match its schema fails
    /// with [`EnvelopeError::PayloadSchemaMismatch`].
    pub fn from_parts(topic: &str, value: Value) -> Result<Self, EnvelopeError> {
        let Ok(known) = Topic::parse(topic) else {
            return Ok(Self::Unknown {
                topic: topic.to_string(),
                value,
            });
        };
        let mismatch = |source: serde_json::Error| EnvelopeError::PayloadSchemaMismatch {
            topic: topic.to_string(),
            detail: source.to_string(),
        };
        Ok(match known {
            Topic::IntentSubmitted => {
                Self::IntentSubmitted(serde_json::from_value(value).map_err(mismatch)?)
            }
            Topic::IntentAccepted => {
                Self::IntentAccepted(serde_json::from_value(value).map_err(mismatch)?)
            }
            Topic::IntentFailed => {
                Self::IntentFailed(serde_json::from_value(value).map_err(mismatch)?)
            }
            Topic::RiskApproved => {
                Self::RiskApproved(serde_json::from_value(value).map_err(mismatch)?)
            }
            Topic::RiskRejected => {
                Self::RiskRejected(serde_json::from_value(value).map_err(mismatch)?)
            }
            Topic::PlanCreated => {
                Self::PlanCreated(serde_json::from_value(value).map_err(mismatch)?)
            }
            Topic::PlanRejected => {
                Self::PlanRejected(serde_json::from_value(value).map_err(mismatch)?)
            }
            Topic::ExecStarted => {
                Self::ExecStarted(serde_json::from_value(value).map_err(mismatch)?)
            }
            Topic::ExecStepSubmitted => {
                Self::ExecStepSubmitted(serde_json::from_value(value).map_err(mismatch)?)
            }
            Topic::ExecStepFilled => {
                Self::ExecStepFilled(serde_json::from_value(value).map_err(mismatch)?)
            }
            Topic::ExecCompleted => {
                Self::ExecCompleted(serde_json::from_value(value).map_err(mismatch)?)
            }
            Topic::ExecFailed => Self::ExecFailed(serde_json::from_value(value).map_err(mismatch)?),
        })
    }
}
