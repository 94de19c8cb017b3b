//! Venue adapter configuration.

use serde::Deserialize;

/// Venue adapter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct VenueConfig {
    /// Venue identifier.
    #[serde(default = "default_venue")]
    pub venue: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// RPC endpoint the production transport would use.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    /// Recipient of swap outputs.
    #[serde(default = "default_recipient")]
    pub recipient_address: String,
}

fn default_venue() -> String {
    "uniswap_v3".to_string()
}

const fn default_chain_id() -> u64 {
    1
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_recipient() -> String {
    "0x000000000000000000000000000000000000dEaD".to_string()
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            venue: default_venue(),
            chain_id: default_chain_id(),
            rpc_url: default_rpc_url(),
            recipient_address: default_recipient(),
        }
    }
}
