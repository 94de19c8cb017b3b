//! Crate-wide error taxonomy.
//!
//! Layer-specific errors (`BusError`, `StoreError`, `VenueError`,
//! `RouteError`, `ValidationError`) are defined here and aggregated into
//! the top-level [`Error`]. Risk rejections and routing failures are not
//! errors in the `Result` sense: they surface as `risk.rejected` and
//! `plan.rejected` events and end up as machine-readable reasons on the
//! intent read model.

use thiserror::Error;

use crate::domain::envelope::EnvelopeError;

/// Failures raised by the event bus.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("publish failed: {0}")]
    PublishFailed(String),

    #[error("invalid subscription pattern '{0}'")]
    InvalidPattern(String),

    #[error("bus is shut down")]
    Closed,
}

/// Failures raised by the event log or the read-model store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt record for key '{key}': {detail}")]
    Corrupt { key: String, detail: String },
}

/// Failures raised by a venue adapter.
///
/// `Transient` failures are eligible for bounded retry in the
/// orchestrator; everything else is terminal for the current attempt.
#[derive(Error, Debug)]
pub enum VenueError {
    /// RPC timeout, nonce conflict, mempool congestion. Retryable.
    #[error("transient venue failure: {0}")]
    Transient(String),

    /// The receipt wait exceeded its timeout without resolving.
    #[error("timed out waiting for receipt of {tx_hash}")]
    ReceiptTimeout { tx_hash: String },

    /// The adapter detected a state it cannot recover from.
    #[error("venue invariant breach: {0}")]
    InvariantBreach(String),

    /// The requested pair is not tradeable on this venue.
    #[error("unsupported pair {base}/{quote}")]
    UnsupportedPair { base: String, quote: String },
}

impl VenueError {
    /// True when the orchestrator may retry the step after this failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::ReceiptTimeout { .. })
    }
}

/// Failures raised by the external route function.
#[derive(Error, Debug)]
pub enum RouteError {
    #[error("no route between the requested assets")]
    NoRoute,

    #[error("route computation timed out")]
    Timeout,

    #[error("route computation failed: {0}")]
    Internal(String),
}

/// Synchronous submission-time validation failures.
///
/// No event is emitted for these; the submitter gets the error back
/// directly.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("amount_in must be positive, got {amount}")]
    NonPositiveAmount { amount: String },

    #[error("amount_in {amount} exceeds the maximum accepted magnitude")]
    AmountOutOfBounds { amount: String },

    #[error("max_slippage must be in (0, 1), got {slippage}")]
    SlippageOutOfRange { slippage: String },

    #[error("time_window_ms must be positive")]
    NonPositiveWindow,

    #[error("target and quote assets must differ")]
    IdenticalAssets,

    #[error("target and quote assets must live on the same chain ({target_chain} != {quote_chain})")]
    CrossChainPair { target_chain: u64, quote_chain: u64 },

    #[error("asset '{symbol}' has an empty address")]
    MissingAddress { symbol: String },
}

/// Top-level error for the crate.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("venue error: {0}")]
    Venue(#[from] VenueError),

    #[error("routing error: {0}")]
    Route(#[from] RouteError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
