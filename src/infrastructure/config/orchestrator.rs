//! Orchestrator configuration.

use serde::Deserialize;

/// Orchestrator retry and timeout configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct OrchestratorConfig {
    /// Total submission attempts per plan.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Hard cap on any single receipt wait in milliseconds.
    #[serde(default = "default_await_receipt_timeout_ms")]
    pub await_receipt_timeout_ms: u64,
    /// Exponential backoff base delay in milliseconds.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Backoff growth factor between attempts.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,
    /// Symmetric jitter fraction applied to each backoff delay.
    #[serde(default = "default_backoff_jitter")]
    pub backoff_jitter: f64,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_await_receipt_timeout_ms() -> u64 {
    120_000
}

const fn default_backoff_base_ms() -> u64 {
    200
}

const fn default_backoff_factor() -> u32 {
    2
}

const fn default_backoff_jitter() -> f64 {
    0.2
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            await_receipt_timeout_ms: default_await_receipt_timeout_ms(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_factor: default_backoff_factor(),
            backoff_jitter: default_backoff_jitter(),
        }
    }
}
