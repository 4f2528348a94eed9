use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How loudly an error should be reported
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Minor,
    Moderate,
    Critical,
}

/// Errors raised while validating or executing trades and wallet operations
#[derive(Debug, Error, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum TradingError {
    #[error("Insufficient funds: required {required:.2}, available {available:.2}")]
    InsufficientFunds { required: f64, available: f64 },

    #[error("Insufficient shares of {symbol}: requested {requested}, held {held}")]
    InsufficientShares {
        symbol: String,
        requested: f64,
        held: f64,
    },

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Symbol is disabled for trading: {0}")]
    SymbolDisabled(String),

    #[error("No price available for {symbol}: {reason}")]
    PriceUnavailable { symbol: String, reason: String },

    #[error("User not found: {0}")]
    UserNotFound(i64),

    #[error("Username already taken: {0}")]
    DuplicateUser(String),

    #[error("Concurrent update on wallet of user {0}")]
    ConcurrentModification(i64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl TradingError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            TradingError::InvalidInput(_) => ErrorSeverity::Minor,
            TradingError::SymbolNotFound(_) => ErrorSeverity::Minor,
            TradingError::SymbolDisabled(_) => ErrorSeverity::Minor,
            TradingError::UserNotFound(_) => ErrorSeverity::Minor,
            TradingError::DuplicateUser(_) => ErrorSeverity::Minor,
            TradingError::InsufficientFunds { .. } => ErrorSeverity::Moderate,
            TradingError::InsufficientShares { .. } => ErrorSeverity::Moderate,
            TradingError::ConcurrentModification(_) => ErrorSeverity::Moderate,
            TradingError::PriceUnavailable { .. } => ErrorSeverity::Critical,
            TradingError::Storage(_) => ErrorSeverity::Critical,
        }
    }

    /// Stable short code used in API payloads and logs
    pub fn code(&self) -> &'static str {
        match self {
            TradingError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TradingError::InsufficientShares { .. } => "INSUFFICIENT_SHARES",
            TradingError::SymbolNotFound(_) => "SYMBOL_NOT_FOUND",
            TradingError::SymbolDisabled(_) => "SYMBOL_DISABLED",
            TradingError::PriceUnavailable { .. } => "PRICE_UNAVAILABLE",
            TradingError::UserNotFound(_) => "USER_NOT_FOUND",
            TradingError::DuplicateUser(_) => "DUPLICATE_USER",
            TradingError::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            TradingError::InvalidInput(_) => "INVALID_INPUT",
            TradingError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Whether retrying the same request might succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TradingError::ConcurrentModification(_)
                | TradingError::PriceUnavailable { .. }
                | TradingError::Storage(_)
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid side: {0}")]
    InvalidSide(String),

    #[error("Invalid username: {0}")]
    InvalidUsername(String),
}

impl From<ValidationError> for TradingError {
    fn from(error: ValidationError) -> Self {
        TradingError::InvalidInput(error.to_string())
    }
}
