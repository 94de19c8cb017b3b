//! Venue adapter port: quote, build, submit, await-receipt against one
//! AMM venue.
//!
//! Implementations must be safe to call concurrently. `submit_tx` is NOT
//! idempotent at the wire level - the orchestrator owns double-submit
//! avoidance under retry - and every `build_swap_tx` must carry a fresh
//! nonce so a retried submission never collides with an earlier one.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::time::Duration;

use crate::domain::id::TxHash;
use crate::domain::intent::Asset;
use crate::error::VenueError;

/// Indicative quote for swapping `amount_in` of base into quote.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceQuote {
    pub amount_out: Decimal,
    /// Venue-specific pool reference (e.g. the pool contract address).
    pub pool_ref: String,
    pub fee_bps: u32,
}

/// A fully-formed transaction ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltTx {
    pub venue: String,
    pub base: Asset,
    pub quote: Asset,
    pub amount_in: Decimal,
    pub min_out: Decimal,
    pub recipient: String,
    pub deadline: DateTime<Utc>,
    /// Fresh per build; never reused across retries.
    pub nonce: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// On-chain execution receipt.
#[derive(Debug, Clone, PartialEq)]
pub struct TxReceipt {
    pub status: ReceiptStatus,
    /// Actual output amount; present on success.
    pub amount_out: Option<Decimal>,
    pub gas_used: u64,
    pub block_number: u64,
}

/// Contract to a single AMM venue.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Venue identifier (e.g. `uniswap_v3`).
    fn venue(&self) -> &str;

    /// Quote `amount_in` of `base` into `quote`.
    async fn price_quote(
        &self,
        base: &Asset,
        quote: &Asset,
        amount_in: Decimal,
    ) -> Result<PriceQuote, VenueError>;

    /// Build a swap transaction with a fresh nonce and the given
    /// deadline.
    async fn build_swap_tx(
        &self,
        base: &Asset,
        quote: &Asset,
        amount_in: Decimal,
        min_out: Decimal,
        recipient: &str,
        deadline: DateTime<Utc>,
    ) -> Result<BuiltTx, VenueError>;

    /// Broadcast a built transaction.
    async fn submit_tx(&self, tx: &BuiltTx) -> Result<TxHash, VenueError>;

    /// Wait up to `timeout` for the receipt of a broadcast transaction.
    async fn wait_receipt(
        &self,
        tx_hash: &TxHash,
        timeout: Duration,
    ) -> Result<TxReceipt, VenueError>;
}
