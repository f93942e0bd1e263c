//! Typed exchange errors.
//!
//! Error codes the venue reports for "you already did this" situations are
//! first-class variants, so call sites can treat them as idempotent success
//! explicitly instead of string-matching inside a catch-all.

use thiserror::Error;

/// Errors surfaced by the exchange client.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Transport-level failure (network, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The venue throttled the request.
    #[error("rate limited")]
    RateLimited,

    /// Order id not known to the venue.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// A conditional (algo) order already exists in this direction.
    /// Idempotent conflict: the protection we wanted is already in place.
    #[error("conditional order already exists: {symbol}")]
    AlgoOrderAlreadyExists { symbol: String },

    /// Margin mode is already the requested one.
    /// Idempotent conflict.
    #[error("margin mode already set: {symbol}")]
    MarginModeAlreadySet { symbol: String },

    /// Requested leverage rejected; the venue caps it lower.
    #[error("leverage rejected for {symbol}: max allowed {max_allowed}")]
    LeverageRejected { symbol: String, max_allowed: u32 },

    /// Not enough margin for the request.
    #[error("insufficient margin: {0}")]
    InsufficientMargin(String),

    /// Order notional below the venue minimum.
    #[error("notional below minimum for {symbol}")]
    MinNotional { symbol: String },

    /// Any other venue business error, with its raw code.
    #[error("exchange error {code}: {message}")]
    Exchange { code: i64, message: String },
}

impl ExchangeError {
    /// Whether this error means the requested state already holds, so the
    /// caller should proceed as if the call succeeded.
    pub fn is_idempotent_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlgoOrderAlreadyExists { .. } | Self::MarginModeAlreadySet { .. }
        )
    }

    /// Whether a retry with backoff is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimited)
    }
}

/// Result type alias for exchange operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;
