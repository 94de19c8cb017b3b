//! Single-writer state coordinator.
//!
//! The coordinator is the only component that mutates durable state. It
//! consumes every domain topic through one single-active queue group and
//! runs each envelope through a fixed pipeline:
//!
//! 1. **Idempotency** - claim `seen:{event_id}`; duplicates are dropped.
//! 2. **Sequencing** - missing sequences are assigned, conflicts keep
//!    the first writer, gaps are buffered up to a bounded window and
//!    failed forward on timeout.
//! 3. **Append** - the envelope lands in the append-only log.
//! 4. **Project** - the pure reducer folds it into the read models.
//!
//! The log is truth: a read-model write failure after a successful
//! append is retried until the projection catches up.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::domain::envelope::EventEnvelope;
use crate::domain::id::{CorrelationId, IntentId, PlanId};
use crate::domain::payload::Payload;
use crate::domain::read_model::{IntentReadModel, PlanReadModel};
use crate::domain::reducer;
use crate::error::StoreError;
use crate::infrastructure::config::CoordinatorConfig;
use crate::port::bus::QueueSubscription;
use crate::port::store::{EventLog, ReadModelStore};

/// Counters for protocol breaches and throughput, shared with health
/// reporting and tests.
#[derive(Debug, Default)]
pub struct CoordinatorMetrics {
    appended: AtomicU64,
    projected: AtomicU64,
    duplicates: AtomicU64,
    sequence_conflicts: AtomicU64,
    sequence_gaps: AtomicU64,
    invalid_transitions: AtomicU64,
    store_unhealthy: AtomicBool,
}

impl CoordinatorMetrics {
    #[must_use]
    pub fn appended(&self) -> u64 {
        self.appended.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn projected(&self) -> u64 {
        self.projected.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn sequence_conflicts(&self) -> u64 {
        self.sequence_conflicts.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn sequence_gaps(&self) -> u64 {
        self.sequence_gaps.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn invalid_transitions(&self) -> u64 {
        self.invalid_transitions.load(Ordering::Relaxed)
    }

    /// True while read-model writes keep failing past the retry
    /// threshold.
    #[must_use]
    pub fn is_store_unhealthy(&self) -> bool {
        self.store_unhealthy.load(Ordering::Relaxed)
    }
}

/// What happened to one ingested envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Appended and projected (possibly together with buffered
    /// successors).
    Applied,
    /// Already processed (`seen:{event_id}` was claimed).
    Duplicate,
    /// Sequence was already taken; envelope kept in the log only.
    ConflictDropped,
    /// Ahead of the contiguous prefix; parked in the gap buffer.
    Buffered,
}

struct GapEntry {
    envelope: EventEnvelope,
    buffered_at: Instant,
}

/// The single writer.
pub struct StateCoordinator {
    log: Arc<dyn EventLog>,
    store: Arc<dyn ReadModelStore>,
    config: CoordinatorConfig,
    metrics: Arc<CoordinatorMetrics>,
    gaps: Mutex<HashMap<CorrelationId, BTreeMap<u64, GapEntry>>>,
    locks: Mutex<HashMap<CorrelationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl StateCoordinator {
    #[must_use]
    pub fn new(
        log: Arc<dyn EventLog>,
        store: Arc<dyn ReadModelStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            log,
            store,
            config,
            metrics: Arc::new(CoordinatorMetrics::default()),
            gaps: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn metrics(&self) -> Arc<CoordinatorMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Consume the coordinator queue group until shutdown. The
    /// subscriptions (one per topic class) are merged into one
    /// single-active loop; the in-flight envelope's ack is finished
    /// before returning.
    pub async fn run(
        self: Arc<Self>,
        subscriptions: Vec<QueueSubscription>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let (merged_tx, mut merged) = tokio::sync::mpsc::unbounded_channel();
        for mut subscription in subscriptions {
            let tx = merged_tx.clone();
            tokio::spawn(async move {
                while let Some(delivery) = subscription.next().await {
                    if tx.send(delivery).is_err() {
                        break;
                    }
                }
            });
        }
        drop(merged_tx);

        let mut flush = tokio::time::interval(Duration::from_millis(500));
        flush.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("State coordinator running");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = flush.tick() => {
                    self.flush_expired_gaps().await;
                }
                delivery = merged.recv() => {
                    let Some(delivery) = delivery else { break };
                    let (envelope, acker) = delivery.into_parts();
                    match self.ingest(envelope).await {
                        Ok(_) => acker.ack(),
                        Err(e) => {
                            // Safe to redeliver: the seen claim was
                            // released on the failure path.
                            error!(error = %e, "Ingest failed, requesting redelivery");
                            acker.nack();
                        }
                    }
                }
            }
        }
        info!("State coordinator stopped");
    }

    /// Run one envelope through the ingest pipeline.
    pub async fn ingest(&self, envelope: EventEnvelope) -> Result<IngestOutcome, StoreError> {
        let lock = self.lock_for(&envelope.correlation_id);
        let guard = lock.lock().await;

        if !self.store.claim_seen(envelope.event_id).await? {
            self.metrics.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(event_id = %envelope.event_id, "Duplicate envelope dropped");
            return Ok(IngestOutcome::Duplicate);
        }

        let event_id = envelope.event_id;
        let outcome = self.sequence_and_apply(envelope).await;
        if outcome.is_err() {
            // The redelivered envelope must not look like a duplicate.
            if let Err(release) = self.store.release_seen(event_id).await {
                error!(event_id = %event_id, error = %release, "Could not release seen claim");
            }
        }
        drop(guard);
        outcome
    }

    async fn sequence_and_apply(
        &self,
        envelope: EventEnvelope,
    ) -> Result<IngestOutcome, StoreError> {
        let correlation_id = envelope.correlation_id.clone();
        let last = self.store.last_sequence(&correlation_id).await?;
        let sequence = match envelope.sequence {
            None => last + 1,
            Some(s) if s <= last => {
                // First writer for this slot wins; keep the loser in the
                // log for audit.
                self.metrics
                    .sequence_conflicts
                    .fetch_add(1, Ordering::Relaxed);
                warn!(
                    correlation_id = %correlation_id,
                    sequence = s,
                    last_sequence = last,
                    topic = envelope.topic(),
                    "Sequence conflict"
                );
                self.log.append(&envelope).await?;
                self.metrics.appended.fetch_add(1, Ordering::Relaxed);
                return Ok(IngestOutcome::ConflictDropped);
            }
            Some(s) if s > last + 1 => {
                return Ok(self.buffer_gap(envelope, s).await?);
            }
            Some(s) => s,
        };

        self.apply_at(envelope, sequence).await?;
        self.drain_ready(&correlation_id, sequence).await?;
        Ok(IngestOutcome::Applied)
    }

    /// Park an envelope that arrived ahead of the contiguous prefix. An
    /// overfull window forces an immediate fail-forward.
    async fn buffer_gap(
        &self,
        envelope: EventEnvelope,
        sequence: u64,
    ) -> Result<IngestOutcome, StoreError> {
        let correlation_id = envelope.correlation_id.clone();
        let overflow = {
            let mut gaps = self.gaps.lock();
            let buffer = gaps.entry(correlation_id.clone()).or_default();
            buffer.insert(
                sequence,
                GapEntry {
                    envelope,
                    buffered_at: Instant::now(),
                },
            );
            buffer.len() > self.config.gap_window
        };
        debug!(
            correlation_id = %correlation_id,
            sequence,
            "Buffered out-of-order envelope"
        );
        if overflow {
            warn!(correlation_id = %correlation_id, "Gap window overflow, failing forward");
            self.fail_forward(&correlation_id).await?;
        }
        Ok(IngestOutcome::Buffered)
    }

    /// Apply buffered successors that became contiguous.
    async fn drain_ready(
        &self,
        correlation_id: &CorrelationId,
        mut applied: u64,
    ) -> Result<(), StoreError> {
        loop {
            let next = {
                let mut gaps = self.gaps.lock();
                let Some(buffer) = gaps.get_mut(correlation_id) else {
                    return Ok(());
                };
                match buffer.remove(&(applied + 1)) {
                    Some(entry) => {
                        if buffer.is_empty() {
                            gaps.remove(correlation_id);
                        }
                        entry.envelope
                    }
                    None => return Ok(()),
                }
            };
            applied += 1;
            self.apply_at(next, applied).await?;
        }
    }

    /// Fail forward past a gap: apply the oldest buffered envelope at
    /// its own sequence, skipping the numbers that never arrived.
    async fn fail_forward(&self, correlation_id: &CorrelationId) -> Result<(), StoreError> {
        let entry = {
            let mut gaps = self.gaps.lock();
            let Some(buffer) = gaps.get_mut(correlation_id) else {
                return Ok(());
            };
            let Some((&sequence, _)) = buffer.iter().next() else {
                return Ok(());
            };
            let entry = buffer
                .remove(&sequence)
                .map(|e| (sequence, e.envelope));
            if buffer.is_empty() {
                gaps.remove(correlation_id);
            }
            entry
        };
        let Some((sequence, envelope)) = entry else {
            return Ok(());
        };

        self.metrics.sequence_gaps.fetch_add(1, Ordering::Relaxed);
        warn!(
            correlation_id = %correlation_id,
            sequence,
            "Failing forward over sequence gap"
        );
        self.apply_at(envelope, sequence).await?;
        self.drain_ready(correlation_id, sequence).await
    }

    /// Expire buffered envelopes whose gap never filled.
    pub async fn flush_expired_gaps(&self) {
        let timeout = Duration::from_secs(self.config.gap_timeout_seconds);
        let expired: Vec<CorrelationId> = {
            let gaps = self.gaps.lock();
            gaps.iter()
                .filter(|(_, buffer)| {
                    buffer
                        .values()
                        .next()
                        .is_some_and(|e| e.buffered_at.elapsed() >= timeout)
                })
                .map(|(correlation, _)| correlation.clone())
                .collect()
        };
        for correlation_id in expired {
            let lock = self.lock_for(&correlation_id);
            let _guard = lock.lock().await;
            if let Err(e) = self.fail_forward(&correlation_id).await {
                error!(correlation_id = %correlation_id, error = %e, "Gap fail-forward failed");
            }
        }
    }

    /// Append + advance + project one envelope at a resolved sequence.
    async fn apply_at(&self, envelope: EventEnvelope, sequence: u64) -> Result<(), StoreError> {
        let envelope = envelope.with_sequence(sequence);
        self.log.append(&envelope).await?;
        self.metrics.appended.fetch_add(1, Ordering::Relaxed);

        // The append succeeded, so from here the projection must
        // eventually happen; the log is truth.
        self.project_with_retry(&envelope, sequence).await;
        Ok(())
    }

    async fn project_with_retry(&self, envelope: &EventEnvelope, sequence: u64) {
        let mut delay = Duration::from_millis(50);
        let cap = Duration::from_millis(self.config.projection_retry_cap_ms);
        let mut failures = 0u32;
        loop {
            match self.project(envelope, sequence).await {
                Ok(()) => {
                    self.metrics.store_unhealthy.store(false, Ordering::Relaxed);
                    self.metrics.projected.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    failures += 1;
                    if failures >= 10 {
                        self.metrics.store_unhealthy.store(true, Ordering::Relaxed);
                    }
                    error!(
                        event_id = %envelope.event_id,
                        failures,
                        error = %e,
                        "Read-model write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(cap);
                }
            }
        }
    }

    /// One projection pass: fold the envelope into both read models and
    /// advance the correlation's sequence watermark.
    async fn project(&self, envelope: &EventEnvelope, sequence: u64) -> Result<(), StoreError> {
        if let Some(intent_id) = envelope.correlation_id.intent_id() {
            let current = self.store.get_intent(intent_id).await?;
            match reducer::apply_intent(current.as_ref(), envelope, sequence) {
                Ok(Some(model)) => self.store.put_intent(&model).await?,
                Ok(None) => {}
                Err(breach) => {
                    self.metrics
                        .invalid_transitions
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        correlation_id = %envelope.correlation_id,
                        topic = %breach.topic,
                        from = ?breach.from,
                        "Invalid transition, projection skipped"
                    );
                }
            }
        }

        if let Some(plan_id) = plan_id_of(&envelope.payload) {
            let current = self.store.get_plan(plan_id).await?;
            match reducer::apply_plan(current.as_ref(), envelope, sequence) {
                Ok(Some(model)) => self.store.put_plan(&model).await?,
                Ok(None) => {}
                Err(breach) => {
                    self.metrics
                        .invalid_transitions
                        .fetch_add(1, Ordering::Relaxed);
                    warn!(
                        plan_id = %plan_id,
                        topic = %breach.topic,
                        "Invalid plan transition, projection skipped"
                    );
                }
            }
        }

        self.store
            .set_last_sequence(&envelope.correlation_id, sequence)
            .await
    }

    /// Rebuild both read models of a correlation by replaying its log
    /// prefix through the reducer from the empty state.
    pub async fn rebuild(&self, correlation_id: &CorrelationId) -> Result<(), StoreError> {
        let lock = self.lock_for(correlation_id);
        let _guard = lock.lock().await;

        let events = self.log.events_for(correlation_id, 0).await?;
        let mut intent: Option<IntentReadModel> = None;
        let mut plans: HashMap<PlanId, PlanReadModel> = HashMap::new();

        for envelope in &events {
            let Some(sequence) = envelope.sequence else {
                continue;
            };
            if envelope.correlation_id.intent_id().is_some() {
                if let Ok(Some(model)) = reducer::apply_intent(intent.as_ref(), envelope, sequence)
                {
                    intent = Some(model);
                }
            }
            if let Some(plan_id) = plan_id_of(&envelope.payload) {
                if let Ok(Some(model)) =
                    reducer::apply_plan(plans.get(&plan_id), envelope, sequence)
                {
                    plans.insert(plan_id, model);
                }
            }
        }

        if let Some(model) = intent {
            self.store.put_intent(&model).await?;
        }
        for model in plans.values() {
            self.store.put_plan(model).await?;
        }
        info!(correlation_id = %correlation_id, events = events.len(), "Rebuild complete");
        Ok(())
    }

    // Read API consumed by the gateway, the planner's fallback lookup,
    // and the HTTP front outside the core.

    pub async fn get_intent(
        &self,
        intent_id: IntentId,
    ) -> Result<Option<IntentReadModel>, StoreError> {
        self.store.get_intent(intent_id).await
    }

    pub async fn get_plan(&self, plan_id: PlanId) -> Result<Option<PlanReadModel>, StoreError> {
        self.store.get_plan(plan_id).await
    }

    /// Ordered envelopes of a correlation from `from_sequence` on.
    pub async fn get_events(
        &self,
        correlation_id: &CorrelationId,
        from_sequence: u64,
    ) -> Result<Vec<EventEnvelope>, StoreError> {
        self.log.events_for(correlation_id, from_sequence).await
    }

    fn lock_for(&self, correlation_id: &CorrelationId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(
            self.locks
                .lock()
                .entry(correlation_id.clone())
                .or_default(),
        )
    }
}

/// Which plan read model an envelope touches, if any.
fn plan_id_of(payload: &Payload) -> Option<PlanId> {
    match payload {
        Payload::PlanCreated(p) => Some(p.plan_id),
        Payload::ExecStarted(p) => Some(p.plan_id),
        Payload::ExecStepSubmitted(p) => Some(p.plan_id),
        Payload::ExecStepFilled(p) => Some(p.plan_id),
        Payload::ExecCompleted(p) => Some(p.plan_id),
        Payload::ExecFailed(p) => Some(p.plan_id),
        _ => None,
    }
}
