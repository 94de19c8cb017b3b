//! Intent types: the declarative trading goal a client submits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::id::IntentId;
use crate::error::ValidationError;

/// Upper magnitude accepted for `amount_in` at submission time.
pub const MAX_AMOUNT_IN: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

/// One ERC-20-shaped asset reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub symbol: String,
    pub chain_id: u64,
    pub address: String,
    pub decimals: u32,
}

impl Asset {
    pub fn new(symbol: impl Into<String>, chain_id: u64, address: impl Into<String>, decimals: u32) -> Self {
        Self {
            symbol: symbol.into(),
            chain_id,
            address: address.into(),
            decimals,
        }
    }
}

/// Direction of the trading goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentType {
    /// Spend the quote asset to obtain the target asset.
    Acquire,
    /// Sell the target asset into the quote asset.
    Dispose,
}

/// How urgently the intent should be worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStyle {
    Aggressive,
    Passive,
    Adaptive,
}

/// Execution constraints attached to an intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentConstraints {
    /// Maximum tolerated slippage, exclusive bounds (0, 1).
    pub max_slippage: Decimal,
    /// Wall-clock budget for the whole lifecycle, from submission.
    pub time_window_ms: u64,
    pub execution_style: ExecutionStyle,
    /// Venue identifiers the client restricts execution to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_venues: Option<Vec<String>>,
}

/// Client-facing submission body. The intent manager validates this,
/// mints the id, and turns it into an [`Intent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitIntent {
    pub intent_type: IntentType,
    /// Ordered pair `[target, quote]`.
    pub assets: [Asset; 2],
    /// Denominated in quote units for `acquire`, target units for
    /// `dispose`.
    pub amount_in: Decimal,
    pub constraints: IntentConstraints,
}

impl SubmitIntent {
    /// Schema and bounds validation. Failures here are returned to the
    /// submitter synchronously; no event is emitted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.amount_in <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveAmount {
                amount: self.amount_in.to_string(),
            });
        }
        if self.amount_in > MAX_AMOUNT_IN {
            return Err(ValidationError::AmountOutOfBounds {
                amount: self.amount_in.to_string(),
            });
        }
        let slippage = self.constraints.max_slippage;
        if slippage <= Decimal::ZERO || slippage >= Decimal::ONE {
            return Err(ValidationError::SlippageOutOfRange {
                slippage: slippage.to_string(),
            });
        }
        if self.constraints.time_window_ms == 0 {
            return Err(ValidationError::NonPositiveWindow);
        }
        let [target, quote] = &self.assets;
        for asset in [target, quote] {
            if asset.address.trim().is_empty() {
                return Err(ValidationError::MissingAddress {
                    symbol: asset.symbol.clone(),
                });
            }
        }
        if target.chain_id != quote.chain_id {
            return Err(ValidationError::CrossChainPair {
                target_chain: target.chain_id,
                quote_chain: quote.chain_id,
            });
        }
        if target.address.eq_ignore_ascii_case(&quote.address) {
            return Err(ValidationError::IdenticalAssets);
        }
        Ok(())
    }

    /// Attach a minted id, producing the payload of `intent.submitted`.
    #[must_use]
    pub fn into_intent(self, intent_id: IntentId) -> Intent {
        Intent {
            intent_id,
            intent_type: self.intent_type,
            assets: self.assets,
            amount_in: self.amount_in,
            constraints: self.constraints,
        }
    }
}

/// Payload of `intent.submitted`: the accepted goal plus its identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub intent_id: IntentId,
    pub intent_type: IntentType,
    /// Ordered pair `[target, quote]`.
    pub assets: [Asset; 2],
    pub amount_in: Decimal,
    pub constraints: IntentConstraints,
}

impl Intent {
    #[must_use]
    pub fn target(&self) -> &Asset {
        &self.assets[0]
    }

    #[must_use]
    pub fn quote(&self) -> &Asset {
        &self.assets[1]
    }

    /// The asset being sold, by intent direction.
    #[must_use]
    pub fn input_asset(&self) -> &Asset {
        match self.intent_type {
            IntentType::Acquire => self.quote(),
            IntentType::Dispose => self.target(),
        }
    }

    /// The asset being bought, by intent direction.
    #[must_use]
    pub fn output_asset(&self) -> &Asset {
        match self.intent_type {
            IntentType::Acquire => self.target(),
            IntentType::Dispose => self.quote(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn weth() -> Asset {
        Asset::new("WETH", 1, "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2", 18)
    }

    fn usdc() -> Asset {
        Asset::new("USDC", 1, "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48", 6)
    }

    fn submission() -> SubmitIntent {
        SubmitIntent {
            intent_type: IntentType::Acquire,
            assets: [weth(), usdc()],
            amount_in: dec!(1000.00),
            constraints: IntentConstraints {
                max_slippage: dec!(0.01),
                time_window_ms: 300_000,
                execution_style: ExecutionStyle::Adaptive,
                allowed_venues: None,
            },
        }
    }

    #[test]
    fn valid_submission_passes() {
        assert!(submission().validate().is_ok());
    }

    #[test]
    fn zero_amount_is_rejected() {
        let mut sub = submission();
        sub.amount_in = Decimal::ZERO;
        assert!(matches!(
            sub.validate(),
            Err(ValidationError::NonPositiveAmount { .. })
        ));
    }

    #[test]
    fn slippage_bounds_are_exclusive() {
        let mut sub = submission();
        sub.constraints.max_slippage = Decimal::ONE;
        assert!(matches!(
            sub.validate(),
            Err(ValidationError::SlippageOutOfRange { .. })
        ));

        sub.constraints.max_slippage = Decimal::ZERO;
        assert!(sub.validate().is_err());
    }

    #[test]
    fn cross_chain_pair_is_rejected() {
        let mut sub = submission();
        sub.assets[1].chain_id = 42161;
        assert!(matches!(
            sub.validate(),
            Err(ValidationError::CrossChainPair { .. })
        ));
    }

    #[test]
    fn acquire_spends_quote_and_buys_target() {
        let intent = submission().into_intent(IntentId::from(crate::domain::EventId::generate()));
        assert_eq!(intent.input_asset().symbol, "USDC");
        assert_eq!(intent.output_asset().symbol, "WETH");
    }

    #[test]
    fn dispose_spends_target_and_buys_quote() {
        let mut sub = submission();
        sub.intent_type = IntentType::Dispose;
        let intent = sub.into_intent(IntentId::from(crate::domain::EventId::generate()));
        assert_eq!(intent.input_asset().symbol, "WETH");
        assert_eq!(intent.output_asset().symbol, "USDC");
    }
}
