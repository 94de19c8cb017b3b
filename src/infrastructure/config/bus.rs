//! Event bus configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::infrastructure::bus::{MemoryBus, MemoryBusOptions};

/// Event bus configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    /// Server-side dedup window in seconds. Must cover the longest
    /// producer retry horizon.
    #[serde(default = "default_dedup_window_seconds")]
    pub dedup_window_seconds: u64,
    /// Queue delivery ack timeout in seconds.
    #[serde(default = "default_ack_timeout_seconds")]
    pub ack_timeout_seconds: u64,
    /// Channel depth per ephemeral tap.
    #[serde(default = "default_ephemeral_depth")]
    pub ephemeral_depth: usize,
}

const fn default_dedup_window_seconds() -> u64 {
    120
}

const fn default_ack_timeout_seconds() -> u64 {
    5
}

const fn default_ephemeral_depth() -> usize {
    256
}

impl BusConfig {
    #[must_use]
    pub fn build(&self) -> MemoryBus {
        MemoryBus::new(MemoryBusOptions {
            dedup_window: Duration::from_secs(self.dedup_window_seconds),
            ack_timeout: Duration::from_secs(self.ack_timeout_seconds),
            ephemeral_depth: self.ephemeral_depth,
        })
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            dedup_window_seconds: default_dedup_window_seconds(),
            ack_timeout_seconds: default_ack_timeout_seconds(),
            ephemeral_depth: default_ephemeral_depth(),
        }
    }
}
