#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::time::sleep;

use swapsmith::app::App;
use swapsmith::application::coordinator::StateCoordinator;
use swapsmith::domain::envelope::EventEnvelope;
use swapsmith::domain::id::{CorrelationId, IntentId};
use swapsmith::domain::read_model::{IntentReadModel, IntentState};
use swapsmith::infrastructure::bus::{MemoryBus, MemoryBusOptions};
use swapsmith::infrastructure::config::Config;
use swapsmith::port::bus::EventBus;
use swapsmith::port::route::RouteSource;
use swapsmith::port::venue::VenueAdapter;
use swapsmith::testkit::route::StaticRouteSource;
use swapsmith::testkit::venue::ScriptedVenueAdapter;

/// A wired core with scripted venue and route doubles.
pub struct TestStack {
    pub app: App,
    pub venue: Arc<ScriptedVenueAdapter>,
    pub router: Arc<StaticRouteSource>,
}

/// Fast-timing config for tests.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.orchestrator.backoff_base_ms = 5;
    config.coordinator.gap_timeout_seconds = 1;
    config
}

/// Stack quoting 0.333 WETH out for the default 1000 USDC acquire.
pub async fn start_stack() -> TestStack {
    start_stack_with(test_config()).await
}

pub async fn start_stack_with(config: Config) -> TestStack {
    let bus = Arc::new(MemoryBus::new(MemoryBusOptions {
        ack_timeout: Duration::from_secs(2),
        ..MemoryBusOptions::default()
    }));
    let venue = Arc::new(ScriptedVenueAdapter::filling(dec!(0.333)));
    let router = Arc::new(StaticRouteSource::quoting(dec!(0.333)));

    let app = App::start_with(
        config,
        bus as Arc<dyn EventBus>,
        Arc::clone(&venue) as Arc<dyn VenueAdapter>,
        Arc::clone(&router) as Arc<dyn RouteSource>,
    )
    .await
    .expect("stack starts");

    TestStack { app, venue, router }
}

/// Poll the read model until the intent reaches `state`.
pub async fn wait_for_state(
    coordinator: &StateCoordinator,
    intent_id: IntentId,
    state: IntentState,
    timeout: Duration,
) -> IntentReadModel {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(Some(model)) = coordinator.get_intent(intent_id).await {
            if model.state == state {
                return model;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "intent {intent_id} did not reach {state:?} within {timeout:?}"
        );
        sleep(Duration::from_millis(10)).await;
    }
}

/// Poll the log until a correlation has at least `count` envelopes.
pub async fn wait_for_events(
    coordinator: &StateCoordinator,
    correlation_id: &CorrelationId,
    count: usize,
    timeout: Duration,
) -> Vec<EventEnvelope> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let events = coordinator
            .get_events(correlation_id, 0)
            .await
            .expect("log read");
        if events.len() >= count {
            return events;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "correlation {correlation_id} has {} events, wanted {count}",
            events.len()
        );
        sleep(Duration::from_millis(10)).await;
    }
}

/// Topic strings of a correlation's envelopes, ascending by sequence.
pub fn topics(events: &[EventEnvelope]) -> Vec<&str> {
    events.iter().map(EventEnvelope::topic).collect()
}
