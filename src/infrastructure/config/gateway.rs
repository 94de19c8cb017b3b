//! Realtime gateway configuration.

use serde::Deserialize;

/// Gateway backpressure configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Bounded per-connection queue depth.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

const fn default_queue_depth() -> usize {
    1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            queue_depth: default_queue_depth(),
        }
    }
}
