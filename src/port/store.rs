//! Durable store ports: the append-only event log and the read-model
//! store.
//!
//! Exactly one writer - the state coordinator - calls the mutating
//! methods. Readers (gateway replay, planner fallback lookup) use the
//! query methods concurrently.

use async_trait::async_trait;

use crate::domain::envelope::EventEnvelope;
use crate::domain::id::{CorrelationId, EventId, IntentId, PlanId};
use crate::domain::read_model::{IntentReadModel, PlanReadModel};
use crate::error::StoreError;

/// Result of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The envelope is now in the log.
    Appended,
    /// An envelope with this `event_id` was already present; nothing was
    /// written.
    Duplicate,
}

/// Append-only event log.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append one envelope. Idempotent on `event_id`; atomic with the
    /// per-correlation high-water-mark advance.
    async fn append(&self, envelope: &EventEnvelope) -> Result<AppendOutcome, StoreError>;

    /// All envelopes of a correlation with `sequence >= from_sequence`,
    /// ascending by sequence.
    async fn events_for(
        &self,
        correlation_id: &CorrelationId,
        from_sequence: u64,
    ) -> Result<Vec<EventEnvelope>, StoreError>;

    /// Highest sequence appended for a correlation, if any.
    async fn last_sequence(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<u64>, StoreError>;
}

/// Key/value read-model store.
///
/// Holds the two materialized read models plus the coordinator's
/// bookkeeping keys (`seen:{event_id}`, `seq:{correlation_id}`).
#[async_trait]
pub trait ReadModelStore: Send + Sync {
    /// Claim `seen:{event_id}`. Returns `true` on first claim, `false`
    /// when the event was already processed.
    async fn claim_seen(&self, event_id: EventId) -> Result<bool, StoreError>;

    /// Release a claim whose processing failed, so the redelivered
    /// envelope is not mistaken for a duplicate.
    async fn release_seen(&self, event_id: EventId) -> Result<(), StoreError>;

    /// `seq:{correlation_id}`: last sequence projected for a correlation.
    async fn last_sequence(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<u64, StoreError>;

    async fn set_last_sequence(
        &self,
        correlation_id: &CorrelationId,
        sequence: u64,
    ) -> Result<(), StoreError>;

    async fn get_intent(&self, intent_id: IntentId) -> Result<Option<IntentReadModel>, StoreError>;

    async fn put_intent(&self, model: &IntentReadModel) -> Result<(), StoreError>;

    async fn get_plan(&self, plan_id: PlanId) -> Result<Option<PlanReadModel>, StoreError>;

    async fn put_plan(&self, model: &PlanReadModel) -> Result<(), StoreError>;

    /// Drop both read models for a correlation (rebuild support). The
    /// `seen` and `seq` bookkeeping keys are left intact.
    async fn delete_models(
        &self,
        intent_id: IntentId,
        plan_ids: &[PlanId],
    ) -> Result<(), StoreError>;
}
