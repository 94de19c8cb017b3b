//! Top-level configuration loading and validation.
//!
//! Loaded from a TOML file; every section has defaults so a missing file
//! still produces a runnable local configuration.

use std::fs;
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;

use super::bus::BusConfig;
use super::coordinator::CoordinatorConfig;
use super::gateway::GatewayConfig;
use super::logging::LoggingConfig;
use super::orchestrator::OrchestratorConfig;
use super::risk::RiskConfig;
use super::venue::VenueConfig;
use crate::error::{Error, Result};

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub venue: VenueConfig,
}

impl Config {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config = Self::parse_toml(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from TOML text.
    pub fn parse_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }

    /// Initialize the tracing subscriber.
    pub fn init_logging(&self) {
        self.logging.init();
    }

    /// Reject configurations that cannot produce a working process.
    pub fn validate(&self) -> Result<()> {
        if self.risk.max_slippage <= Decimal::ZERO || self.risk.max_slippage >= Decimal::ONE {
            return Err(Error::Config(format!(
                "risk.max_slippage must be in (0, 1), got {}",
                self.risk.max_slippage
            )));
        }
        if self.risk.min_time_window_ms > self.risk.max_time_window_ms {
            return Err(Error::Config(
                "risk window bounds are inverted".to_string(),
            ));
        }
        if self.orchestrator.max_attempts == 0 {
            return Err(Error::Config(
                "orchestrator.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.gateway.queue_depth == 0 {
            return Err(Error::Config(
                "gateway.queue_depth must be at least 1".to_string(),
            ));
        }
        if !self
            .risk
            .supported_venues
            .iter()
            .any(|v| v == &self.venue.venue)
        {
            return Err(Error::Config(format!(
                "configured venue '{}' is not in risk.supported_venues",
                self.venue.venue
            )));
        }
        Ok(())
    }
}
