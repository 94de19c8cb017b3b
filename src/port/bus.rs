//! Event bus port.
//!
//! The bus is a named-topic broker with two subscription flavors:
//!
//! - **Queue subscriptions**: at-least-once, load-balanced across the
//!   members of a group, explicit ack per delivery, redelivery on ack
//!   timeout. Used by the planner, orchestrator, and coordinator.
//! - **Ephemeral subscriptions**: best-effort live taps with no
//!   redelivery. Used by the realtime gateway.
//!
//! The bus deduplicates publishes on `event_id` within a configured
//! window. It makes no global ordering promise: per-correlation ordering
//! is the producers' (sequence assignment) and the coordinator's
//! (monotonic projection) job.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::envelope::EventEnvelope;
use crate::domain::id::CorrelationId;
use crate::domain::topic::Pattern;
use crate::error::BusError;

/// Result of a publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// The broker accepted and fanned the envelope out.
    Acked,
    /// The same `event_id` was published within the dedup window; the
    /// envelope was dropped server-side.
    DuplicateSuppressed,
}

/// Completion handle for one queue delivery.
///
/// Exactly one of [`ack`](AckHandle::ack) or [`nack`](AckHandle::nack)
/// should be called; dropping the handle without either leaves the
/// delivery to the ack-timeout redelivery path.
pub trait AckHandle: Send {
    /// The delivery was fully processed; do not redeliver.
    fn ack(self: Box<Self>);
    /// Processing failed; redeliver promptly to the group.
    fn nack(self: Box<Self>);
}

/// One at-least-once delivery from a queue subscription.
pub struct Delivery {
    pub envelope: EventEnvelope,
    acker: Box<dyn AckHandle>,
}

impl Delivery {
    pub fn new(envelope: EventEnvelope, acker: Box<dyn AckHandle>) -> Self {
        Self { envelope, acker }
    }

    /// Acknowledge and consume the delivery.
    pub fn ack(self) {
        self.acker.ack();
    }

    /// Negative-acknowledge: hand the envelope back for redelivery.
    pub fn nack(self) {
        self.acker.nack();
    }

    /// Split into envelope and completion handle.
    #[must_use]
    pub fn into_parts(self) -> (EventEnvelope, Box<dyn AckHandle>) {
        (self.envelope, self.acker)
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("topic", &self.envelope.topic())
            .field("event_id", &self.envelope.event_id)
            .finish()
    }
}

/// Stream of queue-group deliveries.
pub struct QueueSubscription {
    rx: mpsc::UnboundedReceiver<Delivery>,
}

impl QueueSubscription {
    pub fn new(rx: mpsc::UnboundedReceiver<Delivery>) -> Self {
        Self { rx }
    }

    /// Next delivery, or `None` when the bus shut down.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.rx.recv().await
    }
}

/// Where an ephemeral subscription starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeFrom {
    /// Live tail only.
    Now,
    /// Suppress envelopes of `correlation_id` at or below `sequence`
    /// during the handover from a historical replay.
    After {
        correlation_id: CorrelationId,
        sequence: u64,
    },
}

/// Stream of best-effort live envelopes.
pub struct EphemeralSubscription {
    rx: mpsc::Receiver<EventEnvelope>,
}

impl EphemeralSubscription {
    pub fn new(rx: mpsc::Receiver<EventEnvelope>) -> Self {
        Self { rx }
    }

    pub async fn next(&mut self) -> Option<EventEnvelope> {
        self.rx.recv().await
    }
}

/// The broker abstraction.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish one envelope. Dedups on `event_id` within the broker's
    /// window.
    async fn publish(&self, envelope: EventEnvelope) -> Result<PublishOutcome, BusError>;

    /// Join a durable queue group. Envelopes matching `pattern` are
    /// load-balanced across the group's members.
    async fn subscribe_queue(
        &self,
        pattern: Pattern,
        group: &str,
    ) -> Result<QueueSubscription, BusError>;

    /// Open a best-effort live tap.
    async fn subscribe_ephemeral(
        &self,
        pattern: Pattern,
        from: ResumeFrom,
    ) -> Result<EphemeralSubscription, BusError>;
}
