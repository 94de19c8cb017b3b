//! Realtime gateway.
//!
//! Exposes the subscription and resume contract to live clients. A
//! subscription validates its patterns against the topic registry,
//! optionally replays history from the durable log (`sequence >
//! resume_from` for one correlation), emits a `resume_complete` control
//! marker, then live-tails an ephemeral bus subscription.
//!
//! Backpressure is a bounded per-connection queue. Foreign topic
//! classes (`market.*`) shed oldest-first; the domain lifecycle classes
//! are never dropped - a full queue on one of those disconnects the
//! client instead.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{debug, info, warn};

use parking_lot::Mutex;

use crate::application::coordinator::StateCoordinator;
use crate::domain::envelope::EventEnvelope;
use crate::domain::id::CorrelationId;
use crate::domain::topic::{Pattern, TopicClass};
use crate::error::{BusError, Error, Result};
use crate::infrastructure::config::GatewayConfig;
use crate::port::bus::{EventBus, ResumeFrom};

/// Client subscription request.
#[derive(Debug, Clone)]
pub struct SubscribeRequest {
    /// Patterns, e.g. `["intent.*", "exec.*"]`.
    pub topics: Vec<String>,
    /// Restrict delivery to one correlation.
    pub correlation_id: Option<CorrelationId>,
    /// Replay history with `sequence > resume_from` before tailing.
    /// Requires `correlation_id`.
    pub resume_from: Option<u64>,
}

/// Control frames interleaved with envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Historical replay finished; everything after this is live.
    ResumeComplete,
}

/// One message on a client connection.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayMessage {
    Event(EventEnvelope),
    Control(ControlMessage),
}

struct QueueState {
    messages: VecDeque<GatewayMessage>,
    /// Highest sequence delivered per correlation; duplicate suppression
    /// across the replay/live handover.
    last_seen: HashMap<CorrelationId, u64>,
}

/// Bounded per-connection queue with the class-based drop policy.
struct ConnectionQueue {
    depth: usize,
    state: Mutex<QueueState>,
    notify: Notify,
    closed: AtomicBool,
}

impl ConnectionQueue {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            state: Mutex::new(QueueState {
                messages: VecDeque::new(),
                last_seen: HashMap::new(),
            }),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue one message. Returns `false` once the connection is
    /// gone.
    fn push(&self, message: GatewayMessage) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let mut state = self.state.lock();

        if let GatewayMessage::Event(envelope) = &message {
            if let Some(sequence) = envelope.sequence {
                let seen = state
                    .last_seen
                    .get(&envelope.correlation_id)
                    .copied()
                    .unwrap_or(0);
                if sequence <= seen {
                    return true;
                }
                state
                    .last_seen
                    .insert(envelope.correlation_id.clone(), sequence);
            }
        }

        if state.messages.len() >= self.depth {
            let incoming_droppable = match &message {
                GatewayMessage::Event(envelope) => TopicClass::of(envelope.topic()).droppable(),
                GatewayMessage::Control(_) => false,
            };
            if incoming_droppable {
                // Shed the oldest droppable frame to make room; if none
                // exists, shed the incoming one.
                let oldest = state.messages.iter().position(|m| match m {
                    GatewayMessage::Event(e) => TopicClass::of(e.topic()).droppable(),
                    GatewayMessage::Control(_) => false,
                });
                match oldest {
                    Some(idx) => {
                        state.messages.remove(idx);
                    }
                    None => return true,
                }
            } else {
                // Lifecycle frames must not be shed; the slow client
                // loses the connection instead of the data.
                drop(state);
                self.close();
                return false;
            }
        }

        state.messages.push_back(message);
        drop(state);
        self.notify.notify_one();
        true
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn recv(&self) -> Option<GatewayMessage> {
        loop {
            {
                let mut state = self.state.lock();
                if let Some(message) = state.messages.pop_front() {
                    return Some(message);
                }
            }
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.notify.notified().await;
        }
    }
}

/// Handle a client holds for one subscription.
pub struct ClientConnection {
    queue: Arc<ConnectionQueue>,
}

impl ClientConnection {
    /// Next message, or `None` once disconnected and drained.
    pub async fn next(&mut self) -> Option<GatewayMessage> {
        self.queue.recv().await
    }

    /// True when the gateway dropped this client.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.queue.closed.load(Ordering::SeqCst)
    }
}

/// Subscription front for live clients.
pub struct RealtimeGateway {
    bus: Arc<dyn EventBus>,
    coordinator: Arc<StateCoordinator>,
    config: GatewayConfig,
}

impl RealtimeGateway {
    #[must_use]
    pub fn new(
        bus: Arc<dyn EventBus>,
        coordinator: Arc<StateCoordinator>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            bus,
            coordinator,
            config,
        }
    }

    /// Establish one subscription.
    pub async fn subscribe(&self, request: SubscribeRequest) -> Result<ClientConnection> {
        let patterns = validate_patterns(&request.topics)?;
        if request.resume_from.is_some() && request.correlation_id.is_none() {
            return Err(Error::Bus(BusError::InvalidPattern(
                "resume_from requires a correlation_id".to_string(),
            )));
        }

        let queue = Arc::new(ConnectionQueue::new(self.config.queue_depth));

        // Historical replay before the live tail.
        let mut resume_filter = ResumeFrom::Now;
        if let (Some(correlation_id), Some(from)) = (&request.correlation_id, request.resume_from)
        {
            let events = self
                .coordinator
                .get_events(correlation_id, from + 1)
                .await
                .map_err(Error::Store)?;
            let mut replayed = 0usize;
            for envelope in events {
                if patterns.iter().any(|p| p.matches(envelope.topic())) {
                    queue.push(GatewayMessage::Event(envelope));
                    replayed += 1;
                }
            }
            debug!(correlation_id = %correlation_id, replayed, "Resume replay done");
            let high = queue.state.lock().last_seen.get(correlation_id).copied();
            resume_filter = ResumeFrom::After {
                correlation_id: correlation_id.clone(),
                sequence: high.unwrap_or(from),
            };
            queue.push(GatewayMessage::Control(ControlMessage::ResumeComplete));
        }

        // One ephemeral tap per pattern; each feeds the shared queue.
        for pattern in patterns {
            let mut tap = self
                .bus
                .subscribe_ephemeral(pattern, resume_filter.clone())
                .await
                .map_err(Error::Bus)?;
            let queue = Arc::clone(&queue);
            let correlation_filter = request.correlation_id.clone();
            tokio::spawn(async move {
                while let Some(envelope) = tap.next().await {
                    if let Some(filter) = &correlation_filter {
                        if envelope.correlation_id != *filter {
                            continue;
                        }
                    }
                    if !queue.push(GatewayMessage::Event(envelope)) {
                        warn!("Client queue overflowed on a lifecycle topic, disconnecting");
                        break;
                    }
                }
            });
        }

        info!("Gateway subscription established");
        Ok(ClientConnection { queue })
    }
}

fn validate_patterns(topics: &[String]) -> Result<Vec<Pattern>> {
    if topics.is_empty() {
        return Err(Error::Bus(BusError::InvalidPattern(
            "at least one topic pattern is required".to_string(),
        )));
    }
    topics
        .iter()
        .map(|raw| {
            let pattern = Pattern::parse(raw)
                .map_err(|e| Error::Bus(BusError::InvalidPattern(e.to_string())))?;
            if !pattern.matches_registry() {
                return Err(Error::Bus(BusError::InvalidPattern(format!(
                    "pattern '{raw}' matches no registered topic"
                ))));
            }
            Ok(pattern)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::id::{EventId, IntentId, PlanId, TxHash};
    use crate::domain::payload::{ExecCompleted, Payload};

    fn lifecycle_event(seq: u64) -> GatewayMessage {
        let intent_id = IntentId::from(EventId::generate());
        GatewayMessage::Event(EventEnvelope::new(
            Payload::ExecCompleted(ExecCompleted {
                plan_id: PlanId::from(EventId::generate()),
                tx_hash: TxHash::new("0x1"),
                amount_out: dec!(1),
            }),
            CorrelationId::for_intent(intent_id),
            None,
            Some(seq),
        ))
    }

    fn foreign_event(seq: u64) -> GatewayMessage {
        let intent_id = IntentId::from(EventId::generate());
        GatewayMessage::Event(EventEnvelope::new(
            Payload::Unknown {
                topic: "market.tick".to_string(),
                value: serde_json::json!({"px": "1"}),
            },
            CorrelationId::for_intent(intent_id),
            None,
            Some(seq),
        ))
    }

    #[test]
    fn droppable_overflow_sheds_oldest_droppable() {
        let queue = ConnectionQueue::new(2);
        assert!(queue.push(foreign_event(1)));
        assert!(queue.push(foreign_event(1)));
        // Full; a third droppable frame sheds the oldest one.
        assert!(queue.push(foreign_event(1)));
        assert!(!queue.closed.load(Ordering::SeqCst));
        assert_eq!(queue.state.lock().messages.len(), 2);
    }

    #[test]
    fn lifecycle_overflow_disconnects() {
        let queue = ConnectionQueue::new(1);
        assert!(queue.push(lifecycle_event(1)));
        assert!(!queue.push(lifecycle_event(2)));
        assert!(queue.closed.load(Ordering::SeqCst));
    }

    #[test]
    fn duplicate_sequences_are_suppressed_per_correlation() {
        let queue = ConnectionQueue::new(16);
        let message = lifecycle_event(3);
        assert!(queue.push(message.clone()));
        assert!(queue.push(message));
        assert_eq!(queue.state.lock().messages.len(), 1);
    }

    #[test]
    fn empty_topic_list_is_invalid() {
        assert!(validate_patterns(&[]).is_err());
    }

    #[test]
    fn off_registry_pattern_is_invalid() {
        assert!(validate_patterns(&["market.*".to_string()]).is_err());
        assert!(validate_patterns(&["intent.*".to_string()]).is_ok());
    }
}
