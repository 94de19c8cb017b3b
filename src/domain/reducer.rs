//! Pure projection reducer.
//!
//! `apply_intent` and `apply_plan` fold one envelope into the relevant
//! read model. They are the only place lifecycle transitions are
//! defined; the state coordinator calls them on ingest and again on
//! rebuild, which is what makes replay deterministic.
//!
//! Envelopes whose sequence is at or below the model's `last_sequence`
//! are skipped (`Ok(None)`), which makes re-application idempotent.
//! Transitions outside the table fail with [`InvalidTransition`]; the
//! caller records the breach and keeps the envelope in the log.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::envelope::EventEnvelope;
use crate::domain::payload::Payload;
use crate::domain::read_model::{
    IntentReadModel, IntentState, PlanReadModel, PlanStatus,
};

/// A transition outside the lifecycle table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid transition: {topic} in state {from:?}")]
pub struct InvalidTransition {
    pub topic: String,
    pub from: Option<String>,
}

fn invalid(env: &EventEnvelope, from: Option<&dyn std::fmt::Debug>) -> InvalidTransition {
    InvalidTransition {
        topic: env.topic().to_string(),
        from: from.map(|s| format!("{s:?}")),
    }
}

/// Fold one envelope into the intent read model for its correlation.
///
/// Returns `Ok(Some(model))` when the model should be written back,
/// `Ok(None)` when the envelope has no effect (unknown topic, or already
/// applied by sequence).
pub fn apply_intent(
    current: Option<&IntentReadModel>,
    env: &EventEnvelope,
    sequence: u64,
) -> Result<Option<IntentReadModel>, InvalidTransition> {
    if let Some(model) = current {
        if sequence <= model.last_sequence {
            return Ok(None);
        }
    }

    let mut next = match (&env.payload, current) {
        (Payload::Unknown { .. }, _) => return Ok(None),

        (Payload::IntentSubmitted(intent), None) => IntentReadModel {
            intent_id: intent.intent_id,
            state: IntentState::Submitted,
            last_event_id: env.event_id,
            last_sequence: sequence,
            updated_at: env.timestamp,
            latest_plan_id: None,
            reason: None,
            tx_hash: None,
            amount_out: None,
        },
        (Payload::IntentSubmitted(_), Some(model)) => {
            return Err(invalid(env, Some(&model.state)))
        }
        (_, None) => return Err(invalid(env, None)),

        (payload, Some(model)) => {
            let mut next = model.clone();
            next.state = intent_state_after(payload, model.state)
                .ok_or_else(|| invalid(env, Some(&model.state)))?;
            match payload {
                Payload::RiskRejected(p) => next.reason = Some(p.reason),
                Payload::IntentFailed(p) => next.reason = Some(p.reason),
                Payload::PlanRejected(p) => next.reason = Some(p.reason),
                Payload::ExecFailed(p) => next.reason = Some(p.reason),
                Payload::PlanCreated(p) => next.latest_plan_id = Some(p.plan_id),
                Payload::ExecStepSubmitted(p) => next.tx_hash = Some(p.tx_hash.clone()),
                Payload::ExecStepFilled(p) => {
                    // A tx hash fills at most once.
                    if next.amount_out.is_some() && next.tx_hash.as_ref() == Some(&p.tx_hash) {
                        return Err(invalid(env, Some(&model.state)));
                    }
                    next.tx_hash = Some(p.tx_hash.clone());
                    next.amount_out = Some(p.amount_out);
                }
                _ => {}
            }
            next
        }
    };

    next.last_event_id = env.event_id;
    next.last_sequence = sequence;
    next.updated_at = env.timestamp;
    Ok(Some(next))
}

/// Intent state transition table. `None` marks an off-table transition.
fn intent_state_after(payload: &Payload, from: IntentState) -> Option<IntentState> {
    use IntentState::*;
    match payload {
        Payload::RiskApproved(_) if from == Submitted => Some(Submitted),
        Payload::IntentAccepted(_) if from == Submitted => Some(Accepted),
        Payload::RiskRejected(_) if from == Submitted => Some(Rejected),
        Payload::IntentFailed(_) if !from.is_terminal() => Some(Failed),
        Payload::PlanCreated(_) if from == Accepted => Some(Planned),
        Payload::PlanRejected(_) if from == Accepted => Some(Failed),
        Payload::ExecStarted(_) if from == Planned => Some(Executing),
        Payload::ExecStepSubmitted(_) if from == Executing => Some(Executing),
        Payload::ExecStepFilled(_) if from == Executing => Some(Executing),
        Payload::ExecCompleted(_) if from == Executing => Some(Completed),
        Payload::ExecFailed(_) if !from.is_terminal() => Some(Failed),
        _ => None,
    }
}

/// Fold one envelope into the plan read model it references.
///
/// Topics that carry no plan effect return `Ok(None)`.
pub fn apply_plan(
    current: Option<&PlanReadModel>,
    env: &EventEnvelope,
    sequence: u64,
) -> Result<Option<PlanReadModel>, InvalidTransition> {
    if let Some(model) = current {
        if sequence <= model.last_sequence {
            return Ok(None);
        }
    }

    let mut next = match (&env.payload, current) {
        (Payload::PlanCreated(plan), None) => PlanReadModel {
            plan_id: plan.plan_id,
            intent_id: plan.intent_id,
            status: PlanStatus::Planned,
            steps: plan.steps.clone(),
            progress: Decimal::ZERO,
            last_sequence: sequence,
            updated_at: env.timestamp,
        },
        (Payload::PlanCreated(_), Some(model)) => {
            return Err(invalid(env, Some(&model.status)))
        }

        (Payload::ExecStarted(_), Some(model)) if model.status == PlanStatus::Planned => {
            let mut next = model.clone();
            next.status = PlanStatus::Executing;
            next
        }
        (Payload::ExecStepSubmitted(_), Some(model))
            if model.status == PlanStatus::Executing =>
        {
            model.clone()
        }
        (Payload::ExecStepFilled(_), Some(model)) if model.status == PlanStatus::Executing => {
            let mut next = model.clone();
            next.progress = Decimal::ONE;
            next
        }
        (Payload::ExecCompleted(_), Some(model)) if model.status == PlanStatus::Executing => {
            let mut next = model.clone();
            next.status = PlanStatus::Completed;
            next
        }
        (Payload::ExecFailed(_), Some(model))
            if !matches!(model.status, PlanStatus::Completed | PlanStatus::Failed) =>
        {
            let mut next = model.clone();
            next.status = PlanStatus::Failed;
            next
        }

        // Off-table exec transition on an existing plan.
        (
            Payload::ExecStarted(_)
            | Payload::ExecStepSubmitted(_)
            | Payload::ExecStepFilled(_)
            | Payload::ExecCompleted(_)
            | Payload::ExecFailed(_),
            Some(model),
        ) => return Err(invalid(env, Some(&model.status))),

        // Everything else never touches a plan model.
        _ => return Ok(None),
    };

    next.last_sequence = sequence;
    next.updated_at = env.timestamp;
    Ok(Some(next))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::id::{CorrelationId, EventId, IntentId, PlanId, TxHash};
    use crate::domain::intent::{
        Asset, ExecutionStyle, Intent, IntentConstraints, IntentType,
    };
    use crate::domain::payload::{
        ExecCompleted, ExecFailed, ExecStarted, ExecStepFilled, FailureReason, IntentAccepted,
        RiskApproved,
    };

    fn intent(intent_id: IntentId) -> Intent {
        Intent {
            intent_id,
            intent_type: IntentType::Acquire,
            assets: [
                Asset::new("WETH", 1, "0xc02a", 18),
                Asset::new("USDC", 1, "0xa0b8", 6),
            ],
            amount_in: dec!(1000),
            constraints: IntentConstraints {
                max_slippage: dec!(0.01),
                time_window_ms: 300_000,
                execution_style: ExecutionStyle::Adaptive,
                allowed_venues: None,
            },
        }
    }

    fn env_at(payload: Payload, correlation: &CorrelationId, seq: u64) -> EventEnvelope {
        EventEnvelope::new(payload, correlation.clone(), None, Some(seq))
    }

    #[test]
    fn submitted_creates_the_model() {
        let intent_id = IntentId::from(EventId::generate());
        let correlation = CorrelationId::for_intent(intent_id);
        let env = env_at(Payload::IntentSubmitted(intent(intent_id)), &correlation, 1);

        let model = apply_intent(None, &env, 1).unwrap().unwrap();
        assert_eq!(model.state, IntentState::Submitted);
        assert_eq!(model.last_sequence, 1);
        assert_eq!(model.updated_at, env.timestamp);
    }

    #[test]
    fn stale_sequence_is_a_no_op() {
        let intent_id = IntentId::from(EventId::generate());
        let correlation = CorrelationId::for_intent(intent_id);
        let env = env_at(Payload::IntentSubmitted(intent(intent_id)), &correlation, 1);
        let model = apply_intent(None, &env, 1).unwrap().unwrap();

        let approved = env_at(
            Payload::RiskApproved(RiskApproved {
                intent_id,
                notional_usd: dec!(1000),
            }),
            &correlation,
            1,
        );
        assert_eq!(apply_intent(Some(&model), &approved, 1).unwrap(), None);
    }

    #[test]
    fn accepted_requires_submitted_state() {
        let intent_id = IntentId::from(EventId::generate());
        let correlation = CorrelationId::for_intent(intent_id);
        let env = env_at(Payload::IntentSubmitted(intent(intent_id)), &correlation, 1);
        let mut model = apply_intent(None, &env, 1).unwrap().unwrap();
        model.state = IntentState::Completed;

        let accepted = env_at(
            Payload::IntentAccepted(IntentAccepted { intent_id }),
            &correlation,
            2,
        );
        assert!(apply_intent(Some(&model), &accepted, 2).is_err());
    }

    #[test]
    fn terminal_states_absorb_exec_failed() {
        let intent_id = IntentId::from(EventId::generate());
        let correlation = CorrelationId::for_intent(intent_id);
        let env = env_at(Payload::IntentSubmitted(intent(intent_id)), &correlation, 1);
        let mut model = apply_intent(None, &env, 1).unwrap().unwrap();
        model.state = IntentState::Completed;

        let failed = env_at(
            Payload::ExecFailed(ExecFailed {
                plan_id: PlanId::from(EventId::generate()),
                reason: FailureReason::Reverted,
            }),
            &correlation,
            9,
        );
        assert!(apply_intent(Some(&model), &failed, 9).is_err());
    }

    #[test]
    fn duplicate_fill_for_same_tx_hash_is_rejected() {
        let intent_id = IntentId::from(EventId::generate());
        let correlation = CorrelationId::for_intent(intent_id);
        let plan_id = PlanId::from(EventId::generate());
        let env = env_at(Payload::IntentSubmitted(intent(intent_id)), &correlation, 1);
        let mut model = apply_intent(None, &env, 1).unwrap().unwrap();
        model.state = IntentState::Executing;
        model.tx_hash = Some(TxHash::new("0xdead"));
        model.amount_out = Some(dec!(0.5));

        let refill = env_at(
            Payload::ExecStepFilled(ExecStepFilled {
                plan_id,
                tx_hash: TxHash::new("0xdead"),
                amount_out: dec!(0.5),
            }),
            &correlation,
            9,
        );
        assert!(apply_intent(Some(&model), &refill, 9).is_err());
    }

    #[test]
    fn plan_lifecycle_reaches_completed() {
        let intent_id = IntentId::from(EventId::generate());
        let correlation = CorrelationId::for_intent(intent_id);
        let plan_id = PlanId::from(EventId::generate());
        let plan = crate::domain::plan::ExecutionPlan {
            plan_id,
            intent_id,
            steps: vec![crate::domain::plan::PlanStep {
                venue: "uniswap_v3".into(),
                base: Asset::new("USDC", 1, "0xa0b8", 6),
                quote: Asset::new("WETH", 1, "0xc02a", 18),
                amount_in: dec!(1000),
                min_out: dec!(0.32),
                recipient: "0xfeed".into(),
            }],
            estimated_cost: dec!(3),
            estimated_duration_ms: 15_000,
        };

        let created = env_at(Payload::PlanCreated(plan), &correlation, 4);
        let model = apply_plan(None, &created, 4).unwrap().unwrap();
        assert_eq!(model.status, PlanStatus::Planned);
        assert_eq!(model.progress, Decimal::ZERO);

        let started = env_at(
            Payload::ExecStarted(ExecStarted { plan_id, intent_id }),
            &correlation,
            5,
        );
        let model = apply_plan(Some(&model), &started, 5).unwrap().unwrap();
        assert_eq!(model.status, PlanStatus::Executing);

        let filled = env_at(
            Payload::ExecStepFilled(ExecStepFilled {
                plan_id,
                tx_hash: TxHash::new("0xbeef"),
                amount_out: dec!(0.326),
            }),
            &correlation,
            7,
        );
        let model = apply_plan(Some(&model), &filled, 7).unwrap().unwrap();
        assert_eq!(model.progress, Decimal::ONE);

        let completed = env_at(
            Payload::ExecCompleted(ExecCompleted {
                plan_id,
                tx_hash: TxHash::new("0xbeef"),
                amount_out: dec!(0.326),
            }),
            &correlation,
            8,
        );
        let model = apply_plan(Some(&model), &completed, 8).unwrap().unwrap();
        assert_eq!(model.status, PlanStatus::Completed);
    }

    #[test]
    fn risk_events_never_touch_plan_models() {
        let intent_id = IntentId::from(EventId::generate());
        let correlation = CorrelationId::for_intent(intent_id);
        let approved = env_at(
            Payload::RiskApproved(RiskApproved {
                intent_id,
                notional_usd: dec!(1000),
            }),
            &correlation,
            2,
        );
        assert_eq!(apply_plan(None, &approved, 2).unwrap(), None);
    }
}
