//! Startup health checks over the loaded configuration.

use crate::infrastructure::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

#[derive(Debug, Clone)]
pub struct HealthCheck {
    name: &'static str,
    critical: bool,
    status: HealthStatus,
}

impl HealthCheck {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn critical(&self) -> bool {
        self.critical
    }

    pub fn status(&self) -> &HealthStatus {
        &self.status
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthStatus::Healthy)
    }
}

#[derive(Debug, Clone)]
pub struct HealthReport {
    checks: Vec<HealthCheck>,
}

impl HealthReport {
    pub fn checks(&self) -> &[HealthCheck] {
        &self.checks
    }

    /// Healthy when every critical check passes.
    pub fn is_healthy(&self) -> bool {
        self.checks
            .iter()
            .filter(|check| check.critical())
            .all(HealthCheck::is_healthy)
    }
}

pub fn health_check(config: &Config) -> HealthReport {
    let mut checks = Vec::new();

    checks.push(HealthCheck {
        name: "config",
        critical: true,
        status: match config.validate() {
            Ok(()) => HealthStatus::Healthy,
            Err(e) => HealthStatus::Unhealthy(e.to_string()),
        },
    });

    checks.push(HealthCheck {
        name: "venue_rpc",
        critical: true,
        status: if config.venue.rpc_url.trim().is_empty() {
            HealthStatus::Unhealthy("rpc_url is empty".to_string())
        } else {
            HealthStatus::Healthy
        },
    });

    checks.push(HealthCheck {
        name: "recipient",
        critical: true,
        status: if config.venue.recipient_address.trim().is_empty() {
            HealthStatus::Unhealthy("recipient_address is empty".to_string())
        } else {
            HealthStatus::Healthy
        },
    });

    checks.push(HealthCheck {
        name: "reference_prices",
        critical: false,
        status: if config.risk.reference_prices_usd.is_empty() {
            HealthStatus::Unhealthy("no USD reference prices configured".to_string())
        } else {
            HealthStatus::Healthy
        },
    });

    HealthReport { checks }
}
