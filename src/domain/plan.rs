//! Execution plans: the concrete single-step swap derived from an intent.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::id::{IntentId, PlanId};
use crate::domain::intent::Asset;

/// One swap leg. `base` is the asset being sold, `quote` the asset being
/// bought; `amount_in` is denominated in `base` units and `min_out` in
/// `quote` units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub venue: String,
    pub base: Asset,
    pub quote: Asset,
    pub amount_in: Decimal,
    pub min_out: Decimal,
    pub recipient: String,
}

/// Payload of `plan.created`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub plan_id: PlanId,
    pub intent_id: IntentId,
    /// Single-step in V1; kept as a list for the wire format.
    pub steps: Vec<PlanStep>,
    /// Heuristic venue-fee cost estimate, denominated in `base` units.
    pub estimated_cost: Decimal,
    pub estimated_duration_ms: u64,
}

impl ExecutionPlan {
    /// The single step of a V1 plan.
    #[must_use]
    pub fn step(&self) -> &PlanStep {
        &self.steps[0]
    }
}
