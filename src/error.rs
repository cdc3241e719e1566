//! Error types for the trading engine

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the trading engine
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Configuration errors (fatal for the affected chain)
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    // Position model errors
    #[error("Invalid entry price: {0}")]
    InvalidEntryPrice(f64),

    #[error("Invalid position quantity: {0}")]
    InvalidQuantity(f64),

    // Store consistency errors (caller bugs, never swallowed)
    #[error("Duplicate position id: {0}")]
    DuplicateId(String),

    #[error("Position not found: {0}")]
    NotFound(String),

    // Collaborator errors
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Insufficient funds: {available} available, {required} required")]
    InsufficientFunds { available: f64, required: f64 },

    #[error("Feed subscription failed: {0}")]
    FeedSubscription(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is retryable (transient I/O on a collaborator)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Unavailable(_)
                | Error::ExecutionFailed(_)
                | Error::InsufficientFunds { .. }
                | Error::FeedSubscription(_)
        )
    }

    /// Check if this error means the caller broke a store invariant
    pub fn is_inconsistent_state(&self) -> bool {
        matches!(self, Error::DuplicateId(_) | Error::NotFound(_))
    }

    /// Check if this error must stop the affected component from starting
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Config(_) | Error::UnsupportedChain(_))
    }
}
