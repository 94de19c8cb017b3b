//! Deterministic test double for the venue adapter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::domain::id::TxHash;
use crate::domain::intent::Asset;
use crate::error::VenueError;
use crate::port::venue::{BuiltTx, PriceQuote, ReceiptStatus, TxReceipt, VenueAdapter};

/// Scripted outcome for one `wait_receipt` call.
#[derive(Debug, Clone)]
pub enum ScriptedReceipt {
    Fill { amount_out: Decimal },
    Revert,
    /// Pretend the chain is stuck for this long; the call times out if
    /// the caller's budget is shorter.
    Stall { duration: Duration },
}

/// Venue double driven by scripts. Unscripted calls succeed with the
/// default fill.
pub struct ScriptedVenueAdapter {
    default_amount_out: Decimal,
    quotes: Mutex<VecDeque<Result<PriceQuote, VenueError>>>,
    submit_errors: Mutex<VecDeque<VenueError>>,
    receipts: Mutex<VecDeque<ScriptedReceipt>>,
    submitted: Mutex<Vec<BuiltTx>>,
    nonce: AtomicU64,
    receipt_calls: AtomicU64,
}

impl ScriptedVenueAdapter {
    /// A double whose quotes and fills all produce `default_amount_out`.
    #[must_use]
    pub fn filling(default_amount_out: Decimal) -> Self {
        Self {
            default_amount_out,
            quotes: Mutex::new(VecDeque::new()),
            submit_errors: Mutex::new(VecDeque::new()),
            receipts: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            nonce: AtomicU64::new(0),
            receipt_calls: AtomicU64::new(0),
        }
    }

    pub fn push_quote(&self, quote: Result<PriceQuote, VenueError>) {
        self.quotes.lock().push_back(quote);
    }

    pub fn push_submit_error(&self, error: VenueError) {
        self.submit_errors.lock().push_back(error);
    }

    pub fn push_receipt(&self, receipt: ScriptedReceipt) {
        self.receipts.lock().push_back(receipt);
    }

    /// Every transaction submitted so far.
    #[must_use]
    pub fn submitted(&self) -> Vec<BuiltTx> {
        self.submitted.lock().clone()
    }

    #[must_use]
    pub fn receipt_calls(&self) -> u64 {
        self.receipt_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl VenueAdapter for ScriptedVenueAdapter {
    fn venue(&self) -> &str {
        "uniswap_v3"
    }

    async fn price_quote(
        &self,
        _base: &Asset,
        _quote: &Asset,
        _amount_in: Decimal,
    ) -> Result<PriceQuote, VenueError> {
        if let Some(scripted) = self.quotes.lock().pop_front() {
            return scripted;
        }
        Ok(PriceQuote {
            amount_out: self.default_amount_out,
            pool_ref: "0xpool".to_string(),
            fee_bps: 5,
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
        Ok(BuiltTx {
            venue: self.venue().to_string(),
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
        if let Some(error) = self.submit_errors.lock().pop_front() {
            return Err(error);
        }
        self.submitted.lock().push(tx.clone());
        Ok(TxHash::new(format!("0xscripted{:04x}", tx.nonce)))
    }

    async fn wait_receipt(
        &self,
        tx_hash: &TxHash,
        timeout: Duration,
    ) -> Result<TxReceipt, VenueError> {
        self.receipt_calls.fetch_add(1, Ordering::Relaxed);
        let scripted = self.receipts.lock().pop_front();
        match scripted {
            Some(ScriptedReceipt::Revert) => Ok(TxReceipt {
                status: ReceiptStatus::Reverted,
                amount_out: None,
                gas_used: 64_212,
                block_number: 19_000_001,
            }),
            Some(ScriptedReceipt::Stall { duration }) => {
                if duration > timeout {
                    tokio::time::sleep(timeout).await;
                    Err(VenueError::ReceiptTimeout {
                        tx_hash: tx_hash.as_str().to_string(),
                    })
                } else {
                    tokio::time::sleep(duration).await;
                    Ok(self.fill(self.default_amount_out))
                }
            }
            Some(ScriptedReceipt::Fill { amount_out }) => Ok(self.fill(amount_out)),
            None => Ok(self.fill(self.default_amount_out)),
        }
    }
}

impl ScriptedVenueAdapter {
    fn fill(&self, amount_out: Decimal) -> TxReceipt {
        TxReceipt {
            status: ReceiptStatus::Success,
            amount_out: Some(amount_out),
            gas_used: 142_318,
            block_number: 19_000_002,
        }
    }
}
