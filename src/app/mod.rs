//! Process wiring.
//!
//! Components are constructed explicitly and handed their collaborators
//! at startup - there is no service locator. The coordinator is the
//! only component holding mutating references to the log and read-model
//! stores.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::application::coordinator::StateCoordinator;
use crate::application::gateway::RealtimeGateway;
use crate::application::intent_manager::IntentManager;
use crate::application::orchestrator::{self, Orchestrator};
use crate::application::planner::{self, ExecutionPlanner};
use crate::application::risk::RiskGate;
use crate::domain::topic::{Pattern, Topic};
use crate::error::Result;
use crate::infrastructure::config::Config;
use crate::infrastructure::route::VenueRouter;
use crate::infrastructure::store::{MemoryEventLog, MemoryReadModelStore};
use crate::infrastructure::venue::UniswapV3Adapter;
use crate::port::bus::EventBus;
use crate::port::route::RouteSource;
use crate::port::venue::VenueAdapter;

mod health;

pub use health::{health_check, HealthCheck, HealthReport, HealthStatus};

/// Queue group name for the single-active coordinator consumer.
pub const COORDINATOR_GROUP: &str = "coordinator";

/// A fully wired process.
pub struct App {
    pub bus: Arc<dyn EventBus>,
    pub intent_manager: Arc<IntentManager>,
    pub coordinator: Arc<StateCoordinator>,
    pub gateway: Arc<RealtimeGateway>,
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl App {
    /// Wire the default stack: in-process bus, in-memory stores, and
    /// the simulated Uniswap v3 venue.
    pub async fn start(config: Config) -> Result<Self> {
        let bus: Arc<dyn EventBus> = Arc::new(config.bus.build());
        let venue: Arc<dyn VenueAdapter> = Arc::new(UniswapV3Adapter::with_default_pool(
            config.venue.chain_id,
            config
                .risk
                .reference_prices_usd
                .get("WETH")
                .copied()
                .unwrap_or_else(|| rust_decimal::Decimal::from(3_000)),
        ));
        let router: Arc<dyn RouteSource> = Arc::new(VenueRouter::new(Arc::clone(&venue)));
        Self::start_with(config, bus, venue, router).await
    }

    /// Wire the stack against caller-provided adapters. This is the
    /// entry point integration tests use with scripted venues.
    pub async fn start_with(
        config: Config,
        bus: Arc<dyn EventBus>,
        venue: Arc<dyn VenueAdapter>,
        router: Arc<dyn RouteSource>,
    ) -> Result<Self> {
        config.validate()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let log = Arc::new(MemoryEventLog::new());
        let store = Arc::new(MemoryReadModelStore::new());
        let coordinator = Arc::new(StateCoordinator::new(
            log,
            store,
            config.coordinator.clone(),
        ));

        let mut workers = Vec::new();

        // The coordinator subscribes to every domain class through one
        // single-active queue group.
        let mut coordinator_subs = Vec::new();
        for pattern in ["intent.*", "risk.*", "plan.*", "exec.*"] {
            coordinator_subs.push(
                bus.subscribe_queue(
                    Pattern::parse(pattern).map_err(to_bus_error)?,
                    COORDINATOR_GROUP,
                )
                .await?,
            );
        }
        workers.push(tokio::spawn(
            Arc::clone(&coordinator).run(coordinator_subs, shutdown_rx.clone()),
        ));

        let planner = Arc::new(ExecutionPlanner::new(
            Arc::clone(&bus),
            router,
            Arc::clone(&coordinator),
            config.venue.venue.clone(),
            config.venue.recipient_address.clone(),
        ));
        // intent.* feeds the cache and the planning trigger; risk.*
        // lets rejected intents evict their cached payload.
        for pattern in ["intent.*", "risk.*"] {
            let subscription = bus
                .subscribe_queue(
                    Pattern::parse(pattern).map_err(to_bus_error)?,
                    planner::QUEUE_GROUP,
                )
                .await?;
            workers.push(tokio::spawn(
                Arc::clone(&planner).run(subscription, shutdown_rx.clone()),
            ));
        }

        let orchestrator_service = Arc::new(Orchestrator::new(
            Arc::clone(&bus),
            venue,
            Arc::clone(&coordinator),
            config.orchestrator.clone(),
        ));
        let subscription = bus
            .subscribe_queue(
                Pattern::exact(Topic::PlanCreated),
                orchestrator::QUEUE_GROUP,
            )
            .await?;
        workers.push(tokio::spawn(
            orchestrator_service.run(subscription, shutdown_rx.clone()),
        ));

        let intent_manager = Arc::new(IntentManager::new(
            Arc::clone(&bus),
            RiskGate::new(config.risk.clone()),
        ));
        let gateway = Arc::new(RealtimeGateway::new(
            Arc::clone(&bus),
            Arc::clone(&coordinator),
            config.gateway.clone(),
        ));

        info!(venue = %config.venue.venue, "Swapsmith core started");
        Ok(Self {
            bus,
            intent_manager,
            coordinator,
            gateway,
            shutdown_tx,
            workers,
        })
    }

    /// Signal shutdown and wait for every worker to finish its in-flight
    /// envelope.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for worker in self.workers {
            let _ = worker.await;
        }
        info!("Swapsmith core stopped");
    }
}

fn to_bus_error(e: crate::domain::topic::TopicError) -> crate::error::Error {
    crate::error::Error::Bus(crate::error::BusError::InvalidPattern(e.to_string()))
}
