//! Uniswap v3 venue adapter over an in-process chain simulation.
//!
//! Real RPC transport and ABI encoding live outside the core; this
//! adapter keeps the venue contract honest end-to-end: quotes come from
//! pool state, builds carry fresh nonces and deadlines, submits mint tx
//! hashes, and receipts resolve against the pool at fill time - a swap
//! whose `min_out` is no longer coverable reverts, exactly like the real
//! pool contract would.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::debug;

use crate::domain::id::TxHash;
use crate::domain::intent::Asset;
use crate::error::VenueError;
use crate::port::venue::{BuiltTx, PriceQuote, ReceiptStatus, TxReceipt, VenueAdapter};

const VENUE_NAME: &str = "uniswap_v3";
const BPS_DENOMINATOR: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// One simulated pool: spot price of `token1` denominated in `token0`.
#[derive(Debug, Clone)]
pub struct PoolState {
    pub address: String,
    pub token0: String,
    pub token1: String,
    /// Units of token0 per one unit of token1.
    pub spot: Decimal,
    pub fee_bps: u32,
}

impl PoolState {
    fn covers(&self, a: &str, b: &str) -> bool {
        (self.token0.eq_ignore_ascii_case(a) && self.token1.eq_ignore_ascii_case(b))
            || (self.token0.eq_ignore_ascii_case(b) && self.token1.eq_ignore_ascii_case(a))
    }
}

/// Simulated single-venue adapter.
pub struct UniswapV3Adapter {
    chain_id: u64,
    pools: Mutex<Vec<PoolState>>,
    pending: Mutex<HashMap<String, BuiltTx>>,
    nonce: AtomicU64,
    block_number: AtomicU64,
    /// Simulated time from broadcast to inclusion.
    mining_latency: Duration,
}

impl UniswapV3Adapter {
    #[must_use]
    pub fn new(chain_id: u64, pools: Vec<PoolState>) -> Self {
        Self {
            chain_id,
            pools: Mutex::new(pools),
            pending: Mutex::new(HashMap::new()),
            nonce: AtomicU64::new(0),
            block_number: AtomicU64::new(19_000_000),
            mining_latency: Duration::from_millis(10),
        }
    }

    /// Adapter with the canonical WETH/USDC 0.05% pool at the given spot
    /// price (USDC per WETH).
    #[must_use]
    pub fn with_default_pool(chain_id: u64, weth_usdc_spot: Decimal) -> Self {
        Self::new(
            chain_id,
            vec![PoolState {
                address: "0x88e6A0c2dDD26FEEb64F039a2c41296FcB3f5640".to_string(),
                token0: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
                token1: "0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2".to_string(),
                spot: weth_usdc_spot,
                fee_bps: 5,
            }],
        )
    }

    #[must_use]
    pub fn mining_latency(mut self, latency: Duration) -> Self {
        self.mining_latency = latency;
        self
    }

    /// Move a pool's spot price, e.g. to simulate the market running away
    /// from an open order.
    pub fn set_spot(&self, pool_address: &str, spot: Decimal) {
        let mut pools = self.pools.lock();
        if let Some(pool) = pools
            .iter_mut()
            .find(|p| p.address.eq_ignore_ascii_case(pool_address))
        {
            pool.spot = spot;
        }
    }

    fn quote_in_pool(
        pool: &PoolState,
        base: &Asset,
        quote: &Asset,
        amount_in: Decimal,
    ) -> Decimal {
        // token1 is priced in token0 units.
        let gross = if pool.token0.eq_ignore_ascii_case(&base.address) {
            amount_in / pool.spot
        } else {
            amount_in * pool.spot
        };
        let fee = Decimal::from(pool.fee_bps) / BPS_DENOMINATOR;
        (gross * (Decimal::ONE - fee))
            .round_dp_with_strategy(quote.decimals, RoundingStrategy::ToZero)
    }

    fn find_pool(&self, base: &Asset, quote: &Asset) -> Result<PoolState, VenueError> {
        if base.chain_id != self.chain_id || quote.chain_id != self.chain_id {
            return Err(VenueError::UnsupportedPair {
                base: base.symbol.clone(),
                quote: quote.symbol.clone(),
            });
        }
        self.pools
            .lock()
            .iter()
            .find(|p| p.covers(&base.address, &quote.address))
            .cloned()
            .ok_or_else(|| VenueError::UnsupportedPair {
                base: base.symbol.clone(),
                quote: quote.symbol.clone(),
            })
    }
}

#[async_trait]
impl VenueAdapter for UniswapV3Adapter {
    fn venue(&self) -> &str {
        VENUE_NAME
    }

    async fn price_quote(
        &self,
        base: &Asset,
        quote: &Asset,
        amount_in: Decimal,
    ) -> Result<PriceQuote, VenueError> {
        let pool = self.find_pool(base, quote)?;
        let amount_out = Self::quote_in_pool(&pool, base, quote, amount_in);
        Ok(PriceQuote {
            amount_out,
            pool_ref: pool.address,
            fee_bps: pool.fee_bps,
        })
    }

    async fn build_swap_tx(
        &self,
        base: &Asset,
        quote: &Asset,
        amount_in: Decimal,
        min_out: Decimal,
        recipient: &str,
        deadline: DateTime<Utc>,
    ) -> Result<BuiltTx, VenueError> {
        // Pair must still be tradeable at build time.
        self.find_pool(base, quote)?;
        Ok(BuiltTx {
            venue: VENUE_NAME.to_string(),
            base: base.clone(),
            quote: quote.clone(),
            amount_in,
            min_out,
            recipient: recipient.to_string(),
            deadline,
            nonce: self.nonce.fetch_add(1, Ordering::SeqCst),
        })
    }

    async fn submit_tx(&self, tx: &BuiltTx) -> Result<TxHash, VenueError> {
        let salt: u128 = rand::thread_rng().gen();
        let hash = format!("0x{:016x}{salt:032x}", tx.nonce);
        self.pending.lock().insert(hash.clone(), tx.clone());
        debug!(tx_hash = %hash, nonce = tx.nonce, "Transaction broadcast");
        Ok(TxHash::new(hash))
    }

    async fn wait_receipt(
        &self,
        tx_hash: &TxHash,
        timeout: Duration,
    ) -> Result<TxReceipt, VenueError> {
        if timeout < self.mining_latency {
            tokio::time::sleep(timeout).await;
            return Err(VenueError::ReceiptTimeout {
                tx_hash: tx_hash.as_str().to_string(),
            });
        }
        tokio::time::sleep(self.mining_latency).await;

        let tx = self
            .pending
            .lock()
            .remove(tx_hash.as_str())
            .ok_or_else(|| VenueError::InvariantBreach(format!("unknown tx {tx_hash}")))?;

        let block_number = self.block_number.fetch_add(1, Ordering::SeqCst);

        // The router rejects swaps whose deadline passed before inclusion.
        if tx.deadline < Utc::now() {
            return Ok(TxReceipt {
                status: ReceiptStatus::Reverted,
                amount_out: None,
                gas_used: 28_540,
                block_number,
            });
        }

        let pool = self.find_pool(&tx.base, &tx.quote)?;
        let amount_out = Self::quote_in_pool(&pool, &tx.base, &tx.quote, tx.amount_in);
        if amount_out < tx.min_out {
            // The pool moved past the slippage bound; the swap call
            // reverts on-chain.
            return Ok(TxReceipt {
                status: ReceiptStatus::Reverted,
                amount_out: None,
                gas_used: 64_212,
                block_number,
            });
        }

        Ok(TxReceipt {
            status: ReceiptStatus::Success,
            amount_out: Some(amount_out),
            gas_used: 142_318,
            block_number,
        })
    }
}
