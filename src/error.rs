//! Engine-level error taxonomy.
//!
//! The engine boundary (grid manager, reconciler, safety gate, exchange adapter
//! trait) returns `EngineError` so callers can branch on the error taxonomy
//! required by the reconciler's recovery logic. The CLI/binary boundary uses
//! `anyhow::Result` throughout, same as the rest of this codebase.

use thiserror::Error;

/// Errors an exchange adapter call can fail with. Mirrors the taxonomy the
/// reconciler branches on: transient errors are retried, rejections drop the
/// order for this tick, duplicates are adopted idempotently.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("insufficient balance for order")]
    InsufficientBalance,

    #[error("order violates exchange price/quantity precision")]
    PrecisionViolation,

    #[error("duplicate client order id")]
    DuplicateClientOrderId,

    #[error("rate limited by exchange")]
    RateLimited,

    #[error("transient exchange error: {0}")]
    Transient(String),

    #[error("order not found")]
    NotFound,
}

impl ExchangeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ExchangeError::Transient(_) | ExchangeError::RateLimited)
    }
}

/// Top-level engine error. Fatal variants mean the session must refuse to
/// start or must stop; the rest are handled within the tick per §7.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("unable to set one-way position mode")]
    OneWayModeUnavailable,

    #[error("unable to query position at startup: {0}")]
    StartupPositionQueryFailed(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    /// Fatal errors refuse session start; everything else is handled in-tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidConfig(_)
                | EngineError::OneWayModeUnavailable
                | EngineError::StartupPositionQueryFailed(_)
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
