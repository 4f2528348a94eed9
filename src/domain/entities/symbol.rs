use crate::domain::errors::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_SYMBOL_LEN: usize = 20;

/// A ticker in the symbol universe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradableSymbol {
    pub symbol: String,
    pub description: String,
    pub exchange: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}

/// A symbol as listed by a quote provider, before import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolListing {
    pub symbol: String,
    pub description: String,
    pub exchange: String,
}

/// Trim and uppercase a ticker, rejecting anything that is not a plausible symbol
pub fn normalize_symbol(raw: &str) -> Result<String, ValidationError> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(ValidationError::InvalidSymbol(
            "Symbol must not be empty".to_string(),
        ));
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(ValidationError::InvalidSymbol(format!(
            "Symbol '{}' exceeds {} characters",
            symbol, MAX_SYMBOL_LEN
        )));
    }
    if let Some(bad) = symbol
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':')))
    {
        return Err(ValidationError::InvalidSymbol(format!(
            "Symbol '{}' contains invalid character '{}'",
            symbol, bad
        )));
    }
    Ok(symbol)
}
