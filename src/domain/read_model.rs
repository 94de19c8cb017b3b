//! Materialized read models.
//!
//! A read model is a pure function of the event prefix for its
//! correlation: replaying the log through the reducer from the empty
//! state must reproduce it byte-for-byte modulo `updated_at`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::id::{EventId, IntentId, PlanId, TxHash};
use crate::domain::payload::FailureReason;
use crate::domain::plan::PlanStep;

/// Lifecycle state of an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentState {
    Submitted,
    Accepted,
    Planned,
    Executing,
    Completed,
    Failed,
    Rejected,
}

impl IntentState {
    /// Terminal states absorb every later event.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Rejected)
    }
}

/// Keyed `intent:{intent_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentReadModel {
    pub intent_id: IntentId,
    pub state: IntentState,
    pub last_event_id: EventId,
    pub last_sequence: u64,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_plan_id: Option<PlanId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_out: Option<Decimal>,
}

/// Lifecycle state of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStatus {
    Planned,
    Executing,
    Completed,
    Failed,
}

/// Keyed `plan:{plan_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanReadModel {
    pub plan_id: PlanId,
    pub intent_id: IntentId,
    pub status: PlanStatus,
    pub steps: Vec<PlanStep>,
    /// Fraction of the plan that has filled, in `[0, 1]`.
    pub progress: Decimal,
    pub last_sequence: u64,
    pub updated_at: DateTime<Utc>,
}
