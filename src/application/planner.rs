//! Execution planner.
//!
//! Queue-group worker over `intent.*`. Submitted intents are cached in
//! local memory keyed by correlation; when the matching `intent.accepted`
//! arrives the planner resolves the intent (falling back to the
//! coordinator's read API if the cache entry is gone), asks the route
//! function for the best route, and emits a single-step plan.
//!
//! The planner holds no durable state and tolerates duplicate delivery:
//! the coordinator enforces idempotency downstream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::{Decimal, RoundingStrategy};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::application::coordinator::StateCoordinator;
use crate::domain::envelope::EventEnvelope;
use crate::domain::id::{CorrelationId, EventId, PlanId};
use crate::domain::intent::{ExecutionStyle, Intent};
use crate::domain::payload::{FailureReason, Payload, PlanRejected};
use crate::domain::plan::{ExecutionPlan, PlanStep};
use crate::error::RouteError;
use crate::port::bus::{EventBus, QueueSubscription};
use crate::port::route::{Route, RouteSource};

/// Queue group shared by all planner workers.
pub const QUEUE_GROUP: &str = "planner.workers";

/// Routing attempts before rejecting the intent.
const ROUTE_ATTEMPTS: u32 = 2;

/// Consumes accepted intents and emits execution plans.
pub struct ExecutionPlanner {
    bus: Arc<dyn EventBus>,
    router: Arc<dyn RouteSource>,
    coordinator: Arc<StateCoordinator>,
    venue: String,
    recipient: String,
    cache: Mutex<HashMap<CorrelationId, Intent>>,
}

impl ExecutionPlanner {
    #[must_use]
    pub fn new(
        bus: Arc<dyn EventBus>,
        router: Arc<dyn RouteSource>,
        coordinator: Arc<StateCoordinator>,
        venue: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            bus,
            router,
            coordinator,
            venue: venue.into(),
            recipient: recipient.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Worker loop. Finishes the in-flight delivery before honoring
    /// shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut subscription: QueueSubscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Execution planner running");
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
                            error!(error = %e, "Planner publish failed, requesting redelivery");
                            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                            acker.nack();
                        }
                    }
                }
            }
        }
        info!("Execution planner stopped");
    }

    async fn handle(&self, envelope: EventEnvelope) -> crate::error::Result<()> {
        match &envelope.payload {
            Payload::IntentSubmitted(intent) => {
                self.cache
                    .lock()
                    .insert(envelope.correlation_id.clone(), intent.clone());
                Ok(())
            }
            Payload::IntentAccepted(_) => self.plan(&envelope).await,
            // Terminal intent events make the cached payload useless.
            Payload::IntentFailed(_) | Payload::RiskRejected(_) => {
                self.cache.lock().remove(&envelope.correlation_id);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn plan(&self, accepted: &EventEnvelope) -> crate::error::Result<()> {
        let correlation_id = &accepted.correlation_id;
        let Some(intent) = self.resolve_intent(correlation_id).await else {
            // Nothing to plan against; the accepted envelope is either
            // foreign or its submitted event never reached the log.
            warn!(correlation_id = %correlation_id, "No intent payload for accepted envelope");
            return Ok(());
        };

        let next_sequence = accepted.sequence.map(|s| s + 1);
        match self.route_with_retry(&intent).await {
            Ok(route) => {
                // The plan id and the envelope's event id are the same
                // ULID.
                let event_id = EventId::generate();
                let plan = self.build_plan(PlanId::from(event_id), &intent, &route);
                let envelope = EventEnvelope::with_event_id(
                    event_id,
                    Payload::PlanCreated(plan),
                    correlation_id.clone(),
                    Some(accepted.event_id),
                    next_sequence,
                );
                self.bus.publish(envelope).await?;
                self.cache.lock().remove(correlation_id);
                info!(intent_id = %intent.intent_id, "Plan created");
            }
            Err(route_error) => {
                let reason = match route_error {
                    RouteError::NoRoute => FailureReason::NoRoute,
                    RouteError::Timeout => FailureReason::RouteTimeout,
                    RouteError::Internal(_) => FailureReason::RouteInternal,
                };
                warn!(intent_id = %intent.intent_id, %reason, "Routing failed");
                let envelope = EventEnvelope::new(
                    Payload::PlanRejected(PlanRejected {
                        intent_id: intent.intent_id,
                        reason,
                    }),
                    correlation_id.clone(),
                    Some(accepted.event_id),
                    next_sequence,
                );
                self.bus.publish(envelope).await?;
                self.cache.lock().remove(correlation_id);
            }
        }
        Ok(())
    }

    /// Local cache first, then the coordinator's event log.
    async fn resolve_intent(&self, correlation_id: &CorrelationId) -> Option<Intent> {
        if let Some(intent) = self.cache.lock().get(correlation_id).cloned() {
            return Some(intent);
        }
        debug!(correlation_id = %correlation_id, "Cache miss, reading submitted event");
        let events = self
            .coordinator
            .get_events(correlation_id, 0)
            .await
            .ok()?;
        events.into_iter().find_map(|e| match e.payload {
            Payload::IntentSubmitted(intent) => Some(intent),
            _ => None,
        })
    }

    async fn route_with_retry(&self, intent: &Intent) -> Result<Route, RouteError> {
        let base = intent.input_asset();
        let quote = intent.output_asset();
        let mut attempt = 1;
        loop {
            match self.router.best_route(base, quote, intent.amount_in).await {
                Ok(route) => return Ok(route),
                // A missing route is definitive; timeouts and internal
                // errors get one more try.
                Err(RouteError::NoRoute) => return Err(RouteError::NoRoute),
                Err(e) if attempt < ROUTE_ATTEMPTS => {
                    warn!(attempt, error = %e, "Route attempt failed, retrying");
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn build_plan(&self, plan_id: PlanId, intent: &Intent, route: &Route) -> ExecutionPlan {
        let base = intent.input_asset().clone();
        let quote = intent.output_asset().clone();
        let min_out = min_out(
            route.amount_out,
            intent.constraints.max_slippage,
            quote.decimals,
        );

        // Fee-heuristic cost in input units; precise gas accounting
        // belongs to the venue layer.
        let estimated_cost = (intent.amount_in * Decimal::new(3, 3))
            .round_dp_with_strategy(base.decimals, RoundingStrategy::ToZero);

        let venue = intent
            .constraints
            .allowed_venues
            .as_ref()
            .and_then(|venues| venues.first().cloned())
            .unwrap_or_else(|| self.venue.clone());

        ExecutionPlan {
            plan_id,
            intent_id: intent.intent_id,
            steps: vec![PlanStep {
                venue,
                base,
                quote,
                amount_in: intent.amount_in,
                min_out,
                recipient: self.recipient.clone(),
            }],
            estimated_cost,
            estimated_duration_ms: estimated_duration_ms(intent.constraints.execution_style),
        }
    }
}

/// `floor(amount_out * (1 - max_slippage))`, truncated toward zero at
/// the output asset's decimal precision.
#[must_use]
pub fn min_out(amount_out: Decimal, max_slippage: Decimal, decimals: u32) -> Decimal {
    (amount_out * (Decimal::ONE - max_slippage))
        .round_dp_with_strategy(decimals, RoundingStrategy::ToZero)
}

const fn estimated_duration_ms(style: ExecutionStyle) -> u64 {
    match style {
        ExecutionStyle::Aggressive => 5_000,
        ExecutionStyle::Adaptive => 15_000,
        ExecutionStyle::Passive => 60_000,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn min_out_truncates_toward_zero() {
        // 0.9995 WETH quoted, 1% slippage: 0.989505 exactly.
        assert_eq!(min_out(dec!(0.9995), dec!(0.01), 18), dec!(0.989505));
        // Truncation, not rounding: the tail is cut, never rounded up.
        assert_eq!(min_out(dec!(1), dec!(0.0000005), 6), dec!(0.999999));
    }

    #[test]
    fn duration_scales_with_style() {
        assert!(
            estimated_duration_ms(ExecutionStyle::Aggressive)
                < estimated_duration_ms(ExecutionStyle::Passive)
        );
    }
}
