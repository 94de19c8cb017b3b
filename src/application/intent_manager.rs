//! Intent submission front.
//!
//! `submit` is the only write entry point for clients. It validates
//! synchronously, mints the intent identity, and drives the
//! submitted -> risk -> accepted publish chain. The manager never
//! writes to any store: everything downstream of the bus is the state
//! coordinator's job.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info, warn};

use crate::application::risk::{RiskGate, RiskVerdict};
use crate::domain::envelope::EventEnvelope;
use crate::domain::id::{CorrelationId, EventId, IntentId};
use crate::domain::intent::{Intent, SubmitIntent};
use crate::domain::payload::{
    FailureReason, IntentAccepted, IntentFailed, Payload, RiskApproved, RiskRejected,
};
use crate::error::{BusError, Result};
use crate::port::bus::EventBus;

const PUBLISH_ATTEMPTS: u32 = 3;
const PUBLISH_RETRY_BASE: Duration = Duration::from_millis(50);

/// Accepts intent submissions and emits the acceptance chain.
#[derive(Clone)]
pub struct IntentManager {
    bus: Arc<dyn EventBus>,
    risk: RiskGate,
}

impl IntentManager {
    #[must_use]
    pub fn new(bus: Arc<dyn EventBus>, risk: RiskGate) -> Self {
        Self { bus, risk }
    }

    /// Submit one intent.
    ///
    /// Synchronous up to the `intent.submitted` publish ack; the risk
    /// outcome and acceptance events are driven by a detached task, so
    /// dropping this future cannot cancel them. Validation failures
    /// surface synchronously and emit nothing.
    pub async fn submit(&self, submission: SubmitIntent) -> Result<IntentId> {
        submission.validate()?;

        let event_id = EventId::generate();
        let intent_id = IntentId::from(event_id);
        let correlation_id = CorrelationId::for_intent(intent_id);
        let intent = submission.into_intent(intent_id);

        let submitted = EventEnvelope::with_event_id(
            event_id,
            Payload::IntentSubmitted(intent.clone()),
            correlation_id.clone(),
            None,
            Some(1),
        );
        // If the root publish cannot ack, the intent never existed.
        self.publish_with_retry(&submitted).await?;
        info!(%intent_id, "Intent submitted");

        let manager = self.clone();
        let submitted_id = submitted.event_id;
        tokio::spawn(async move {
            manager
                .drive_acceptance(intent, correlation_id, submitted_id)
                .await;
        });

        Ok(intent_id)
    }

    /// The risk and acceptance chain, detached from the submitter.
    async fn drive_acceptance(
        &self,
        intent: Intent,
        correlation_id: CorrelationId,
        submitted_id: EventId,
    ) {
        let intent_id = intent.intent_id;
        match self.risk.evaluate(&intent) {
            RiskVerdict::Approved { notional_usd } => {
                let approved = EventEnvelope::new(
                    Payload::RiskApproved(RiskApproved {
                        intent_id,
                        notional_usd,
                    }),
                    correlation_id.clone(),
                    Some(submitted_id),
                    Some(2),
                );
                if let Err(e) = self.publish_with_retry(&approved).await {
                    self.fail_intent(intent_id, &correlation_id, submitted_id, &e)
                        .await;
                    return;
                }

                let accepted = EventEnvelope::new(
                    Payload::IntentAccepted(IntentAccepted { intent_id }),
                    correlation_id.clone(),
                    Some(approved.event_id),
                    Some(3),
                );
                if let Err(e) = self.publish_with_retry(&accepted).await {
                    self.fail_intent(intent_id, &correlation_id, approved.event_id, &e)
                        .await;
                    return;
                }
                info!(%intent_id, "Intent accepted");
            }
            RiskVerdict::Rejected { reason } => {
                warn!(%intent_id, %reason, "Intent rejected by risk gate");
                let rejected = EventEnvelope::new(
                    Payload::RiskRejected(RiskRejected { intent_id, reason }),
                    correlation_id.clone(),
                    Some(submitted_id),
                    Some(2),
                );
                if let Err(e) = self.publish_with_retry(&rejected).await {
                    self.fail_intent(intent_id, &correlation_id, submitted_id, &e)
                        .await;
                }
            }
        }
    }

    /// Best-effort `intent.failed` after the acceptance chain could not
    /// be published. Sequence is left for the coordinator to assign: the
    /// failed publish may or may not have landed server-side.
    async fn fail_intent(
        &self,
        intent_id: IntentId,
        correlation_id: &CorrelationId,
        causation_id: EventId,
        publish_error: &BusError,
    ) {
        error!(%intent_id, error = %publish_error, "Acceptance chain publish exhausted retries");
        let failed = EventEnvelope::new(
            Payload::IntentFailed(IntentFailed {
                intent_id,
                reason: FailureReason::AcceptPublishFailed,
            }),
            correlation_id.clone(),
            Some(causation_id),
            None,
        );
        if let Err(e) = self.publish_with_retry(&failed).await {
            error!(%intent_id, error = %e, "Could not record intent failure");
        }
    }

    async fn publish_with_retry(&self, envelope: &EventEnvelope) -> std::result::Result<(), BusError> {
        let mut delay = PUBLISH_RETRY_BASE;
        let mut attempt = 1;
        loop {
            match self.bus.publish(envelope.clone()).await {
                Ok(_) => return Ok(()),
                Err(e) if attempt < PUBLISH_ATTEMPTS => {
                    warn!(
                        topic = envelope.topic(),
                        attempt,
                        error = %e,
                        "Publish failed, retrying"
                    );
                    let jitter = rand::thread_rng().gen_range(0.8..1.2);
                    tokio::time::sleep(delay.mul_f64(jitter)).await;
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
