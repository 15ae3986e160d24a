use thiserror::Error;

use crate::{OrderSide, RejectionReason};

#[derive(Debug, Error)]
pub enum Error {
    #[error("Insufficient history: need at least {required} samples, got {available}")]
    InsufficientHistory { required: usize, available: usize },

    #[error("Invalid price series: {0}")]
    InvalidSeries(String),

    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Order rejected: {side} {quantity} {symbol}: {reason}")]
    OrderRejected {
        symbol: String,
        side: OrderSide,
        quantity: f64,
        reason: RejectionReason,
    },

    #[error("Order timed out: {side} {quantity} {symbol}; fill status unknown, check the exchange")]
    OrderTimeout {
        symbol: String,
        side: OrderSide,
        quantity: f64,
    },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Exchange API error: {0}")]
    Exchange(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Failures that clear up on their own; the caller waits for the next
    /// cycle instead of alerting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::InsufficientHistory { .. } | Error::DataUnavailable(_) | Error::Http(_)
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
