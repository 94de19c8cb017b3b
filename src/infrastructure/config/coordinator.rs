//! State coordinator configuration.

use serde::Deserialize;

/// Coordinator sequencing configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CoordinatorConfig {
    /// Maximum out-of-order envelopes buffered per correlation.
    #[serde(default = "default_gap_window")]
    pub gap_window: usize,
    /// How long a buffered envelope waits for its gap to fill before the
    /// coordinator fails forward, in seconds.
    #[serde(default = "default_gap_timeout_seconds")]
    pub gap_timeout_seconds: u64,
    /// Backoff cap for read-model write retries, in milliseconds.
    #[serde(default = "default_projection_retry_cap_ms")]
    pub projection_retry_cap_ms: u64,
}

const fn default_gap_window() -> usize {
    256
}

const fn default_gap_timeout_seconds() -> u64 {
    30
}

const fn default_projection_retry_cap_ms() -> u64 {
    5_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            gap_window: default_gap_window(),
            gap_timeout_seconds: default_gap_timeout_seconds(),
            projection_retry_cap_ms: default_projection_retry_cap_ms(),
        }
    }
}
