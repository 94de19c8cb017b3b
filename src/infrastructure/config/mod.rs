//! Application configuration.
//!
//! One section per concern, each with serde defaults so a partial TOML
//! file (or none at all) still yields a runnable configuration.

mod bus;
mod coordinator;
mod gateway;
mod logging;
mod orchestrator;
mod risk;
mod settings;
mod venue;

pub use bus::BusConfig;
pub use coordinator::CoordinatorConfig;
pub use gateway::GatewayConfig;
pub use logging::LoggingConfig;
pub use orchestrator::OrchestratorConfig;
pub use risk::RiskConfig;
pub use settings::Config;
pub use venue::VenueConfig;
