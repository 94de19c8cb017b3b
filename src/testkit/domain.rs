//! Builders for domain primitives used across tests.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::domain::intent::{
    Asset, ExecutionStyle, IntentConstraints, IntentType, SubmitIntent,
};

/// Mainnet WETH.
#[must_use]
pub fn weth() -> Asset {
    Asset::new("WETH", 1, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18)
}

/// Mainnet USDC.
#[must_use]
pub fn usdc() -> Asset {
    Asset::new("USDC", 1, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6)
}

/// Acquire WETH with USDC under the given constraints.
#[must_use]
pub fn acquire_weth(amount_in: Decimal, max_slippage: Decimal, time_window_ms: u64) -> SubmitIntent {
    SubmitIntent {
        intent_type: IntentType::Acquire,
        assets: [weth(), usdc()],
        amount_in,
        constraints: IntentConstraints {
            max_slippage,
            time_window_ms,
            execution_style: ExecutionStyle::Adaptive,
            allowed_venues: None,
        },
    }
}

/// The scenario-A submission: 1000 USDC into WETH, 1% slippage, 5
/// minute window.
#[must_use]
pub fn default_acquire() -> SubmitIntent {
    acquire_weth(dec!(1000.00), dec!(0.01), 300_000)
}
