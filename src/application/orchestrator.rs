//! Plan orchestrator.
//!
//! Queue-group worker over `plan.created`. Each plan runs a step state
//! machine:
//!
//! ```text
//! Planned -> Building -> Submitted -> Awaiting -> (Filled | Reverted | TimedOut)
//! ```
//!
//! Reverts and transient venue failures are retried with exponential
//! backoff up to the configured attempt budget, with a fresh
//! `build_swap_tx` (fresh nonce, re-derived deadline headroom) per
//! attempt. The intent's deadline - `submitted_at + time_window_ms` from
//! the root envelope - caps both the retry loop and every single receipt
//! wait.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::application::coordinator::StateCoordinator;
use crate::domain::envelope::EventEnvelope;
use crate::domain::id::{CorrelationId, EventId, PlanId};
use crate::domain::payload::{
    ExecCompleted, ExecFailed, ExecStarted, ExecStepFilled, ExecStepSubmitted, FailureReason,
    Payload,
};
use crate::domain::plan::ExecutionPlan;
use crate::error::{Error, VenueError};
use crate::infrastructure::config::OrchestratorConfig;
use crate::port::bus::{EventBus, QueueSubscription};
use crate::port::venue::{ReceiptStatus, VenueAdapter};

/// Queue group shared by all orchestrator workers.
pub const QUEUE_GROUP: &str = "orchestrator.workers";

/// Drives plans through the venue lifecycle.
pub struct Orchestrator {
    bus: Arc<dyn EventBus>,
    venue: Arc<dyn VenueAdapter>,
    coordinator: Arc<StateCoordinator>,
    config: OrchestratorConfig,
    /// Plans whose `exec.started` already went out; survives bus
    /// redelivery within the process.
    started: Mutex<HashSet<PlanId>>,
    /// Next emission sequence per correlation.
    sequences: Mutex<HashMap<CorrelationId, u64>>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        bus: Arc<dyn EventBus>,
        venue: Arc<dyn VenueAdapter>,
        coordinator: Arc<StateCoordinator>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            bus,
            venue,
            coordinator,
            config,
            started: Mutex::new(HashSet::new()),
            sequences: Mutex::new(HashMap::new()),
        }
    }

    /// Worker loop. Finishes the in-flight plan before honoring
    /// shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut subscription: QueueSubscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Orchestrator running");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                delivery = subscription.next() => {
                    let Some(delivery) = delivery else { break };
                    let (envelope, acker) = delivery.into_parts();
                    match self.handle(envelope).await {
                        Ok(()) => acker.ack(),
                        Err(e) => {
                            error!(error = %e, "Plan execution interrupted, requesting redelivery");
                            // Damp the redelivery loop; the usual cause
                            // is the coordinator lagging on the root
                            // envelope.
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            acker.nack();
                        }
                    }
                }
            }
        }
        info!("Orchestrator stopped");
    }

    async fn handle(&self, envelope: EventEnvelope) -> crate::error::Result<()> {
        let Payload::PlanCreated(plan) = &envelope.payload else {
            return Ok(());
        };
        if plan.steps.is_empty() {
            warn!(plan_id = %plan.plan_id, "Plan has no steps, ignoring");
            return Ok(());
        }
        self.execute(&envelope, plan).await
    }

    async fn execute(&self, plan_env: &EventEnvelope, plan: &ExecutionPlan) -> crate::error::Result<()> {
        let correlation_id = &plan_env.correlation_id;
        let deadline = self.intent_deadline(correlation_id).await?;

        self.init_sequence(correlation_id, plan_env.sequence);
        let mut causation = plan_env.event_id;

        // exec.started goes out exactly once per plan from this process;
        // racing workers are resolved by the coordinator's sequencing.
        // The guard entry is rolled back if the publish fails, so the
        // redelivered plan retries the emit instead of skipping it.
        if self.started.lock().insert(plan.plan_id) {
            let started = self
                .emit(
                    correlation_id,
                    causation,
                    Payload::ExecStarted(ExecStarted {
                        plan_id: plan.plan_id,
                        intent_id: plan.intent_id,
                    }),
                )
                .await;
            match started {
                Ok(event_id) => causation = event_id,
                Err(e) => {
                    self.started.lock().remove(&plan.plan_id);
                    return Err(e);
                }
            }
        }

        let step = plan.step();
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            if attempt > self.config.max_attempts {
                return self
                    .fail(
                        correlation_id,
                        causation,
                        plan.plan_id,
                        FailureReason::MaxAttemptsExceeded,
                    )
                    .await;
            }
            if Utc::now() >= deadline {
                return self
                    .fail(
                        correlation_id,
                        causation,
                        plan.plan_id,
                        FailureReason::DeadlineExceeded,
                    )
                    .await;
            }

            // Building: fresh nonce and the intent's hard deadline.
            let tx = match self
                .venue
                .build_swap_tx(
                    &step.base,
                    &step.quote,
                    step.amount_in,
                    step.min_out,
                    &step.recipient,
                    deadline,
                )
                .await
            {
                Ok(tx) => tx,
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "Build failed");
                    self.backoff(attempt).await;
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Terminal build failure");
                    return self
                        .fail(correlation_id, causation, plan.plan_id, FailureReason::Reverted)
                        .await;
                }
            };

            // Submitted.
            let tx_hash = match self.venue.submit_tx(&tx).await {
                Ok(hash) => hash,
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "Submit failed");
                    self.backoff(attempt).await;
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Terminal submit failure");
                    return self
                        .fail(correlation_id, causation, plan.plan_id, FailureReason::Reverted)
                        .await;
                }
            };
            causation = self
                .emit(
                    correlation_id,
                    causation,
                    Payload::ExecStepSubmitted(ExecStepSubmitted {
                        plan_id: plan.plan_id,
                        attempt,
                        tx_hash: tx_hash.clone(),
                    }),
                )
                .await?;

            // Awaiting: bounded by the per-await cap and the deadline.
            let remaining = remaining_until(deadline);
            let cap = Duration::from_millis(self.config.await_receipt_timeout_ms);
            match self.venue.wait_receipt(&tx_hash, remaining.min(cap)).await {
                Ok(receipt) if receipt.status == ReceiptStatus::Success => {
                    let amount_out = receipt.amount_out.unwrap_or(step.min_out);
                    causation = self
                        .emit(
                            correlation_id,
                            causation,
                            Payload::ExecStepFilled(ExecStepFilled {
                                plan_id: plan.plan_id,
                                tx_hash: tx_hash.clone(),
                                amount_out,
                            }),
                        )
                        .await?;
                    self.emit(
                        correlation_id,
                        causation,
                        Payload::ExecCompleted(ExecCompleted {
                            plan_id: plan.plan_id,
                            tx_hash,
                            amount_out,
                        }),
                    )
                    .await?;
                    info!(plan_id = %plan.plan_id, attempt, "Plan completed");
                    return Ok(());
                }
                Ok(_) => {
                    warn!(plan_id = %plan.plan_id, attempt, "Swap reverted");
                    self.backoff(attempt).await;
                }
                Err(VenueError::ReceiptTimeout { .. }) if Utc::now() >= deadline => {
                    return self
                        .fail(
                            correlation_id,
                            causation,
                            plan.plan_id,
                            FailureReason::DeadlineExceeded,
                        )
                        .await;
                }
                Err(e) if e.is_transient() => {
                    warn!(attempt, error = %e, "Receipt wait failed");
                    self.backoff(attempt).await;
                }
                Err(e) => {
                    error!(error = %e, "Terminal receipt failure");
                    return self
                        .fail(correlation_id, causation, plan.plan_id, FailureReason::Reverted)
                        .await;
                }
            }
        }
    }

    async fn fail(
        &self,
        correlation_id: &CorrelationId,
        causation: EventId,
        plan_id: PlanId,
        reason: FailureReason,
    ) -> crate::error::Result<()> {
        warn!(%plan_id, %reason, "Plan failed");
        self.emit(
            correlation_id,
            causation,
            Payload::ExecFailed(ExecFailed { plan_id, reason }),
        )
        .await?;
        Ok(())
    }

    /// Publish one lifecycle event at the correlation's next sequence.
    /// Returns the new envelope's event id for causation threading.
    ///
    /// A failed publish hands its sequence number back, so the retried
    /// emission after redelivery reuses the slot instead of leaving a
    /// gap.
    async fn emit(
        &self,
        correlation_id: &CorrelationId,
        causation: EventId,
        payload: Payload,
    ) -> crate::error::Result<EventId> {
        let sequence = self.alloc_sequence(correlation_id);
        let envelope = EventEnvelope::new(
            payload,
            correlation_id.clone(),
            Some(causation),
            Some(sequence),
        );
        let event_id = envelope.event_id;
        match self.bus.publish(envelope).await {
            Ok(_) => Ok(event_id),
            Err(e) => {
                self.release_sequence(correlation_id, sequence);
                Err(Error::Bus(e))
            }
        }
    }

    /// Deadline of the intent that owns this correlation: the root
    /// envelope's timestamp plus its execution window.
    async fn intent_deadline(
        &self,
        correlation_id: &CorrelationId,
    ) -> crate::error::Result<DateTime<Utc>> {
        let events = self
            .coordinator
            .get_events(correlation_id, 0)
            .await
            .map_err(Error::Store)?;
        let root = events.iter().find_map(|e| match &e.payload {
            Payload::IntentSubmitted(intent) => {
                Some((e.timestamp, intent.constraints.time_window_ms))
            }
            _ => None,
        });
        let Some((submitted_at, window_ms)) = root else {
            // The coordinator has not persisted the root yet; redeliver.
            return Err(Error::Store(crate::error::StoreError::Unavailable(format!(
                "no intent.submitted in log for {correlation_id}"
            ))));
        };
        let window = chrono::Duration::milliseconds(i64::try_from(window_ms).unwrap_or(i64::MAX));
        Ok(submitted_at + window)
    }

    fn init_sequence(&self, correlation_id: &CorrelationId, plan_sequence: Option<u64>) {
        let mut sequences = self.sequences.lock();
        sequences
            .entry(correlation_id.clone())
            .or_insert(plan_sequence.unwrap_or(0) + 1);
    }

    fn alloc_sequence(&self, correlation_id: &CorrelationId) -> u64 {
        let mut sequences = self.sequences.lock();
        let next = sequences.entry(correlation_id.clone()).or_insert(1);
        let sequence = *next;
        *next += 1;
        sequence
    }

    /// Return an allocated sequence whose publish never landed.
    /// Emissions per correlation are sequential, so only the most
    /// recent allocation can come back.
    fn release_sequence(&self, correlation_id: &CorrelationId, sequence: u64) {
        let mut sequences = self.sequences.lock();
        if let Some(next) = sequences.get_mut(correlation_id) {
            if *next == sequence + 1 {
                *next = sequence;
            }
        }
    }

    /// Exponential backoff with symmetric jitter.
    async fn backoff(&self, attempt: u32) {
        let factor = self.config.backoff_factor.max(1);
        let exp = factor.saturating_pow(attempt.saturating_sub(1));
        let base = Duration::from_millis(self.config.backoff_base_ms) * exp;
        let jitter = self.config.backoff_jitter.clamp(0.0, 1.0);
        let scale = rand::thread_rng().gen_range((1.0 - jitter)..=(1.0 + jitter));
        tokio::time::sleep(base.mul_f64(scale)).await;
    }
}

fn remaining_until(deadline: DateTime<Utc>) -> Duration {
    (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}
