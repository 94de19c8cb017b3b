//! Risk gate configuration.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Deserialize;

/// Risk gate configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskConfig {
    /// Maximum USD notional accepted per intent.
    #[serde(default = "default_max_notional_usd")]
    pub max_notional_usd: Decimal,
    /// Maximum tolerated slippage (e.g. 0.05 = 5%).
    #[serde(default = "default_max_slippage")]
    pub max_slippage: Decimal,
    /// Accepted execution window, inclusive bounds in milliseconds.
    #[serde(default = "default_min_time_window_ms")]
    pub min_time_window_ms: u64,
    #[serde(default = "default_max_time_window_ms")]
    pub max_time_window_ms: u64,
    /// Venue identifiers the deployment supports.
    #[serde(default = "default_supported_venues")]
    pub supported_venues: Vec<String>,
    /// Static USD reference prices used for notional valuation.
    #[serde(default = "default_reference_prices")]
    pub reference_prices_usd: HashMap<String, Decimal>,
}

fn default_max_notional_usd() -> Decimal {
    Decimal::from(10_000)
}

fn default_max_slippage() -> Decimal {
    Decimal::new(5, 2) // 5%
}

const fn default_min_time_window_ms() -> u64 {
    1_000
}

const fn default_max_time_window_ms() -> u64 {
    3_600_000
}

fn default_supported_venues() -> Vec<String> {
    vec!["uniswap_v3".to_string()]
}

fn default_reference_prices() -> HashMap<String, Decimal> {
    HashMap::from([
        ("USDC".to_string(), Decimal::ONE),
        ("USDT".to_string(), Decimal::ONE),
        ("DAI".to_string(), Decimal::ONE),
        ("WETH".to_string(), Decimal::from(3_000)),
    ])
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_notional_usd: default_max_notional_usd(),
            max_slippage: default_max_slippage(),
            min_time_window_ms: default_min_time_window_ms(),
            max_time_window_ms: default_max_time_window_ms(),
            supported_venues: default_supported_venues(),
            reference_prices_usd: default_reference_prices(),
        }
    }
}
