//! In-memory event log and read-model store.
//!
//! The in-process equivalents of the durable backing stores. Both keep
//! the single-writer discipline at the type level only by convention -
//! the coordinator is the sole component handed a reference that
//! mutates them.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::envelope::EventEnvelope;
use crate::domain::id::{CorrelationId, EventId, IntentId, PlanId};
use crate::domain::read_model::{IntentReadModel, PlanReadModel};
use crate::error::StoreError;
use crate::port::store::{AppendOutcome, EventLog, ReadModelStore};

#[derive(Default)]
struct LogInner {
    by_correlation: HashMap<CorrelationId, Vec<EventEnvelope>>,
    event_ids: HashSet<EventId>,
    last_sequence: HashMap<CorrelationId, u64>,
}

/// Append-only in-memory event log.
#[derive(Default)]
pub struct MemoryEventLog {
    inner: RwLock<LogInner>,
}

impl MemoryEventLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of rows across all correlations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().event_ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, envelope: &EventEnvelope) -> Result<AppendOutcome, StoreError> {
        let mut inner = self.inner.write();
        if !inner.event_ids.insert(envelope.event_id) {
            return Ok(AppendOutcome::Duplicate);
        }
        if let Some(sequence) = envelope.sequence {
            let high = inner
                .last_sequence
                .entry(envelope.correlation_id.clone())
                .or_insert(0);
            if sequence > *high {
                *high = sequence;
            }
        }
        inner
            .by_correlation
            .entry(envelope.correlation_id.clone())
            .or_default()
            .push(envelope.clone());
        Ok(AppendOutcome::Appended)
    }

    async fn events_for(
        &self,
        correlation_id: &CorrelationId,
        from_sequence: u64,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        let inner = self.inner.read();
        let mut events: Vec<EventEnvelope> = inner
            .by_correlation
            .get(correlation_id)
            .map(|rows| {
                rows.iter()
                    .filter(|e| e.sequence.is_some_and(|s| s >= from_sequence))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }

    async fn last_sequence(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<u64>, StoreError> {
        Ok(self.inner.read().last_sequence.get(correlation_id).copied())
    }
}

#[derive(Default)]
struct ReadModelInner {
    seen: HashSet<EventId>,
    sequences: HashMap<CorrelationId, u64>,
    intents: HashMap<IntentId, IntentReadModel>,
    plans: HashMap<PlanId, PlanReadModel>,
}

/// In-memory key/value read-model store.
#[derive(Default)]
pub struct MemoryReadModelStore {
    inner: RwLock<ReadModelInner>,
}

impl MemoryReadModelStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReadModelStore for MemoryReadModelStore {
    async fn claim_seen(&self, event_id: EventId) -> Result<bool, StoreError> {
        Ok(self.inner.write().seen.insert(event_id))
    }

    async fn release_seen(&self, event_id: EventId) -> Result<(), StoreError> {
        self.inner.write().seen.remove(&event_id);
        Ok(())
    }

    async fn last_sequence(&self, correlation_id: &CorrelationId) -> Result<u64, StoreError> {
        Ok(self
            .inner
            .read()
            .sequences
            .get(correlation_id)
            .copied()
            .unwrap_or(0))
    }

    async fn set_last_sequence(
        &self,
        correlation_id: &CorrelationId,
        sequence: u64,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .sequences
            .insert(correlation_id.clone(), sequence);
        Ok(())
    }

    async fn get_intent(&self, intent_id: IntentId) -> Result<Option<IntentReadModel>, StoreError> {
        Ok(self.inner.read().intents.get(&intent_id).cloned())
    }

    async fn put_intent(&self, model: &IntentReadModel) -> Result<(), StoreError> {
        self.inner
            .write()
            .intents
            .insert(model.intent_id, model.clone());
        Ok(())
    }

    async fn get_plan(&self, plan_id: PlanId) -> Result<Option<PlanReadModel>, StoreError> {
        Ok(self.inner.read().plans.get(&plan_id).cloned())
    }

    async fn put_plan(&self, model: &PlanReadModel) -> Result<(), StoreError> {
        self.inner.write().plans.insert(model.plan_id, model.clone());
        Ok(())
    }

    async fn delete_models(
        &self,
        intent_id: IntentId,
        plan_ids: &[PlanId],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write();
        inner.intents.remove(&intent_id);
        for plan_id in plan_ids {
            inner.plans.remove(plan_id);
        }
        Ok(())
    }
}
