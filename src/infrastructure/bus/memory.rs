//! In-process implementation of the [`EventBus`] port.
//!
//! Behaves like one logical broker node: server-side dedup on `event_id`
//! within a sliding window, durable queue groups with round-robin
//! load-balancing and ack-timeout redelivery, and bounded best-effort
//! ephemeral taps. Publishes to a queue group with no members yet are
//! parked and flushed when the first member joins.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::domain::envelope::EventEnvelope;
use crate::domain::id::EventId;
use crate::domain::topic::Pattern;
use crate::error::BusError;
use crate::port::bus::{
    AckHandle, Delivery, EphemeralSubscription, EventBus, PublishOutcome, QueueSubscription,
    ResumeFrom,
};

/// Broker tuning knobs.
#[derive(Debug, Clone)]
pub struct MemoryBusOptions {
    /// Sliding dedup window; must cover the longest producer retry
    /// horizon.
    pub dedup_window: Duration,
    /// Redelivery kicks in when a queue delivery is not acked within
    /// this long.
    pub ack_timeout: Duration,
    /// Channel depth for each ephemeral tap.
    pub ephemeral_depth: usize,
}

impl Default for MemoryBusOptions {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(120),
            ack_timeout: Duration::from_secs(5),
            ephemeral_depth: 256,
        }
    }
}

struct QueueGroupState {
    members: Vec<mpsc::UnboundedSender<Delivery>>,
    next_member: usize,
    /// Envelopes published before the first member joined.
    parked: VecDeque<EventEnvelope>,
}

struct QueueGroup {
    pattern: Pattern,
    name: String,
    ack_timeout: Duration,
    state: Mutex<QueueGroupState>,
    redeliveries: AtomicU64,
}

impl QueueGroup {
    fn new(pattern: Pattern, name: String, ack_timeout: Duration) -> Self {
        Self {
            pattern,
            name,
            ack_timeout,
            state: Mutex::new(QueueGroupState {
                members: Vec::new(),
                next_member: 0,
                parked: VecDeque::new(),
            }),
            redeliveries: AtomicU64::new(0),
        }
    }

    /// Hand one envelope to the next live member, or park it when the
    /// group has no members yet.
    fn deliver(group: &Arc<Self>, envelope: EventEnvelope) {
        let settled = Arc::new(AtomicBool::new(false));
        let delivery = Delivery::new(
            envelope.clone(),
            Box::new(MemoryAck {
                settled: Arc::clone(&settled),
                group: Arc::clone(group),
                envelope: envelope.clone(),
            }),
        );

        let delivered = {
            let mut state = group.state.lock();
            let mut pending = Some(delivery);
            // Round-robin over members, dropping the ones whose receiver
            // is gone.
            while let Some(delivery) = pending.take() {
                if state.members.is_empty() {
                    pending = Some(delivery);
                    break;
                }
                let idx = state.next_member % state.members.len();
                match state.members[idx].send(delivery) {
                    Ok(()) => {
                        state.next_member = idx + 1;
                    }
                    Err(mpsc::error::SendError(returned)) => {
                        state.members.remove(idx);
                        pending = Some(returned);
                    }
                }
            }
            if pending.is_some() {
                state.parked.push_back(envelope.clone());
                false
            } else {
                true
            }
        };

        if delivered {
            let group = Arc::clone(group);
            tokio::spawn(async move {
                tokio::time::sleep(group.ack_timeout).await;
                if !settled.swap(true, Ordering::SeqCst) {
                    group.redeliveries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        group = %group.name,
                        topic = envelope.topic(),
                        event_id = %envelope.event_id,
                        "Ack timeout, redelivering"
                    );
                    Self::deliver(&group, envelope);
                }
            });
        }
    }

    fn join(group: &Arc<Self>) -> QueueSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let parked: Vec<EventEnvelope> = {
            let mut state = group.state.lock();
            state.members.push(tx);
            state.parked.drain(..).collect()
        };
        for envelope in parked {
            Self::deliver(group, envelope);
        }
        QueueSubscription::new(rx)
    }
}

struct MemoryAck {
    settled: Arc<AtomicBool>,
    group: Arc<QueueGroup>,
    envelope: EventEnvelope,
}

impl AckHandle for MemoryAck {
    fn ack(self: Box<Self>) {
        self.settled.store(true, Ordering::SeqCst);
    }

    fn nack(self: Box<Self>) {
        if !self.settled.swap(true, Ordering::SeqCst) {
            self.group.redeliveries.fetch_add(1, Ordering::Relaxed);
            QueueGroup::deliver(&self.group, self.envelope.clone());
        }
    }
}

struct EphemeralEntry {
    pattern: Pattern,
    filter: ResumeFrom,
    tx: mpsc::Sender<EventEnvelope>,
    dropped: Arc<AtomicU64>,
}

struct BusState {
    dedup: HashMap<EventId, Instant>,
    dedup_order: VecDeque<(Instant, EventId)>,
    groups: HashMap<(String, String), Arc<QueueGroup>>,
    ephemerals: Vec<EphemeralEntry>,
}

/// Single logical in-process broker.
pub struct MemoryBus {
    options: MemoryBusOptions,
    state: Mutex<BusState>,
    suppressed: AtomicU64,
}

impl MemoryBus {
    #[must_use]
    pub fn new(options: MemoryBusOptions) -> Self {
        Self {
            options,
            state: Mutex::new(BusState {
                dedup: HashMap::new(),
                dedup_order: VecDeque::new(),
                groups: HashMap::new(),
                ephemerals: Vec::new(),
            }),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Total publishes suppressed by the dedup window.
    #[must_use]
    pub fn suppressed_count(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    fn prune_dedup(state: &mut BusState, window: Duration, now: Instant) {
        while let Some((seen_at, id)) = state.dedup_order.front().copied() {
            if now.duration_since(seen_at) < window {
                break;
            }
            state.dedup_order.pop_front();
            state.dedup.remove(&id);
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(MemoryBusOptions::default())
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, envelope: EventEnvelope) -> Result<PublishOutcome, BusError> {
        let (groups, ephemerals) = {
            let mut state = self.state.lock();
            let now = Instant::now();
            Self::prune_dedup(&mut state, self.options.dedup_window, now);

            if state.dedup.contains_key(&envelope.event_id) {
                self.suppressed.fetch_add(1, Ordering::Relaxed);
                debug!(
                    event_id = %envelope.event_id,
                    topic = envelope.topic(),
                    "Duplicate publish suppressed"
                );
                return Ok(PublishOutcome::DuplicateSuppressed);
            }
            state.dedup.insert(envelope.event_id, now);
            state.dedup_order.push_back((now, envelope.event_id));

            let groups: Vec<Arc<QueueGroup>> = state
                .groups
                .values()
                .filter(|g| g.pattern.matches(envelope.topic()))
                .map(Arc::clone)
                .collect();

            // Prune closed taps while we hold the lock.
            state.ephemerals.retain(|e| !e.tx.is_closed());
            let ephemerals: Vec<(Pattern, ResumeFrom, mpsc::Sender<EventEnvelope>, Arc<AtomicU64>)> =
                state
                    .ephemerals
                    .iter()
                    .filter(|e| e.pattern.matches(envelope.topic()))
                    .map(|e| {
                        (
                            e.pattern.clone(),
                            e.filter.clone(),
                            e.tx.clone(),
                            Arc::clone(&e.dropped),
                        )
                    })
                    .collect();
            (groups, ephemerals)
        };

        trace!(
            topic = envelope.topic(),
            groups = groups.len(),
            taps = ephemerals.len(),
            "Publishing"
        );

        for group in &groups {
            QueueGroup::deliver(group, envelope.clone());
        }

        for (_, filter, tx, dropped) in ephemerals {
            if let ResumeFrom::After {
                correlation_id,
                sequence,
            } = &filter
            {
                let seen = envelope.correlation_id == *correlation_id
                    && envelope.sequence.is_some_and(|s| s <= *sequence);
                if seen {
                    continue;
                }
            }
            if tx.try_send(envelope.clone()).is_err() {
                dropped.fetch_add(1, Ordering::Relaxed);
            }
        }

        Ok(PublishOutcome::Acked)
    }

    async fn subscribe_queue(
        &self,
        pattern: Pattern,
        group: &str,
    ) -> Result<QueueSubscription, BusError> {
        let group = {
            let mut state = self.state.lock();
            let key = (pattern.as_str().to_string(), group.to_string());
            Arc::clone(state.groups.entry(key).or_insert_with(|| {
                Arc::new(QueueGroup::new(
                    pattern.clone(),
                    group.to_string(),
                    self.options.ack_timeout,
                ))
            }))
        };
        Ok(QueueGroup::join(&group))
    }

    async fn subscribe_ephemeral(
        &self,
        pattern: Pattern,
        from: ResumeFrom,
    ) -> Result<EphemeralSubscription, BusError> {
        let (tx, rx) = mpsc::channel(self.options.ephemeral_depth);
        self.state.lock().ephemerals.push(EphemeralEntry {
            pattern,
            filter: from,
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        });
        Ok(EphemeralSubscription::new(rx))
    }
}
