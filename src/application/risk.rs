//! Pre-acceptance risk gate.
//!
//! Stateless: every rule is a pure function of the intent and the
//! configured limits. Checks run in order and the first violation wins.

use rust_decimal::Decimal;
use tracing::debug;

use crate::domain::intent::Intent;
use crate::domain::payload::FailureReason;
use crate::infrastructure::config::RiskConfig;

/// Outcome of a risk evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum RiskVerdict {
    Approved {
        /// USD notional the gate valued the intent at.
        notional_usd: Decimal,
    },
    Rejected {
        reason: FailureReason,
    },
}

impl RiskVerdict {
    #[must_use]
    pub const fn is_approved(&self) -> bool {
        matches!(self, Self::Approved { .. })
    }
}

/// Stateless policy gate evaluated synchronously at submission.
#[derive(Debug, Clone)]
pub struct RiskGate {
    config: RiskConfig,
}

impl RiskGate {
    #[must_use]
    pub const fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    /// Evaluate one intent against the V1 rule set.
    #[must_use]
    pub fn evaluate(&self, intent: &Intent) -> RiskVerdict {
        let notional = self.notional_usd(intent);
        if notional > self.config.max_notional_usd {
            debug!(%notional, limit = %self.config.max_notional_usd, "Notional limit breached");
            return RiskVerdict::Rejected {
                reason: FailureReason::NotionalLimit,
            };
        }

        if intent.constraints.max_slippage > self.config.max_slippage {
            return RiskVerdict::Rejected {
                reason: FailureReason::SlippageLimit,
            };
        }

        let window = intent.constraints.time_window_ms;
        if window < self.config.min_time_window_ms || window > self.config.max_time_window_ms {
            return RiskVerdict::Rejected {
                reason: FailureReason::WindowOutOfRange,
            };
        }

        if let Some(venues) = &intent.constraints.allowed_venues {
            let unsupported = venues
                .iter()
                .any(|v| !self.config.supported_venues.contains(v));
            if venues.is_empty() || unsupported {
                return RiskVerdict::Rejected {
                    reason: FailureReason::UnsupportedVenue,
                };
            }
        }

        RiskVerdict::Approved {
            notional_usd: notional,
        }
    }

    /// Value `amount_in` in USD using the static reference price table.
    ///
    /// Symbols without a reference price are valued at parity; the
    /// amount bound still applies upstream.
    #[must_use]
    pub fn notional_usd(&self, intent: &Intent) -> Decimal {
        let asset = intent.input_asset();
        let price = self
            .config
            .reference_prices_usd
            .get(&asset.symbol)
            .copied()
            .unwrap_or(Decimal::ONE);
        intent.amount_in * price
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;
    use crate::domain::id::{EventId, IntentId};
    use crate::domain::intent::{
        Asset, ExecutionStyle, IntentConstraints, IntentType, SubmitIntent,
    };

    fn intent_with(
        amount_in: Decimal,
        max_slippage: Decimal,
        time_window_ms: u64,
        allowed_venues: Option<Vec<String>>,
    ) -> Intent {
        let sub = SubmitIntent {
            intent_type: IntentType::Acquire,
            assets: [
                Asset::new("WETH", 1, "0xc02a", 18),
                Asset::new("USDC", 1, "0xa0b8", 6),
            ],
            amount_in,
            constraints: IntentConstraints {
                max_slippage,
                time_window_ms,
                execution_style: ExecutionStyle::Adaptive,
                allowed_venues,
            },
        };
        sub.into_intent(IntentId::from(EventId::generate()))
    }

    fn gate() -> RiskGate {
        RiskGate::new(RiskConfig::default())
    }

    #[test]
    fn within_all_limits_is_approved() {
        let verdict = gate().evaluate(&intent_with(dec!(1000), dec!(0.01), 300_000, None));
        assert_eq!(
            verdict,
            RiskVerdict::Approved {
                notional_usd: dec!(1000)
            }
        );
    }

    #[test]
    fn notional_over_cap_is_rejected() {
        let verdict = gate().evaluate(&intent_with(dec!(10001), dec!(0.01), 300_000, None));
        assert_eq!(
            verdict,
            RiskVerdict::Rejected {
                reason: FailureReason::NotionalLimit
            }
        );
    }

    #[test]
    fn dispose_notional_uses_target_reference_price() {
        // Disposing 4 WETH at the 3000 reference price = 12k USD.
        let sub = SubmitIntent {
            intent_type: IntentType::Dispose,
            assets: [
                Asset::new("WETH", 1, "0xc02a", 18),
                Asset::new("USDC", 1, "0xa0b8", 6),
            ],
            amount_in: dec!(4),
            constraints: IntentConstraints {
                max_slippage: dec!(0.01),
                time_window_ms: 300_000,
                execution_style: ExecutionStyle::Adaptive,
                allowed_venues: None,
            },
        };
        let intent = sub.into_intent(IntentId::from(EventId::generate()));
        let verdict = gate().evaluate(&intent);
        assert_eq!(
            verdict,
            RiskVerdict::Rejected {
                reason: FailureReason::NotionalLimit
            }
        );
    }

    #[test]
    fn slippage_over_cap_is_rejected() {
        let verdict = gate().evaluate(&intent_with(dec!(1000), dec!(0.1), 300_000, None));
        assert_eq!(
            verdict,
            RiskVerdict::Rejected {
                reason: FailureReason::SlippageLimit
            }
        );
    }

    #[test]
    fn window_bounds_are_enforced() {
        let gate = gate();
        for window in [999, 3_600_001] {
            assert_eq!(
                gate.evaluate(&intent_with(dec!(1000), dec!(0.01), window, None)),
                RiskVerdict::Rejected {
                    reason: FailureReason::WindowOutOfRange
                }
            );
        }
        assert!(gate
            .evaluate(&intent_with(dec!(1000), dec!(0.01), 1_000, None))
            .is_approved());
    }

    #[test]
    fn unknown_venue_is_rejected() {
        let verdict = gate().evaluate(&intent_with(
            dec!(1000),
            dec!(0.01),
            300_000,
            Some(vec!["sushiswap".to_string()]),
        ));
        assert_eq!(
            verdict,
            RiskVerdict::Rejected {
                reason: FailureReason::UnsupportedVenue
            }
        );
    }

    #[test]
    fn supported_venue_allow_list_passes() {
        assert!(gate()
            .evaluate(&intent_with(
                dec!(1000),
                dec!(0.01),
                300_000,
                Some(vec!["uniswap_v3".to_string()]),
            ))
            .is_approved());
    }
}
