//! Error types for the trading engine.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or stale market data. The affected market is skipped for the
    /// tick; other markets are unaffected.
    #[error("market data unavailable: {0}")]
    DataUnavailable(String),

    /// Fewer generators reported than the configured minimum. Not a failure,
    /// just no decision this tick.
    #[error("insufficient signal: {0}")]
    InsufficientSignal(String),

    /// The sizer declined to produce an order.
    #[error("risk rejected: {0}")]
    RiskRejected(String),

    /// Gateway rejected or timed out after the retry budget was exhausted.
    #[error("execution failure: {0}")]
    ExecutionFailure(String),

    /// A fill was reported for an order the engine does not know about, or
    /// the lifecycle observed an impossible state. Fatal for the market
    /// until a reconciliation pass against the gateway completes.
    #[error("state corruption: {0}")]
    StateCorruption(String),

    /// A lifecycle operation was requested from the wrong state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
