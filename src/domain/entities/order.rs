use crate::domain::errors::ValidationError;
use crate::domain::value_objects::{price::Price, quantity::Quantity};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeSide {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(ValidationError::InvalidSide(format!(
                "'{}' must be 'BUY' or 'SELL'",
                other
            ))),
        }
    }
}

/// A market order priced at execution time
#[derive(Debug, Clone)]
pub struct TradeRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: Quantity,
    pub price: Price,
}

impl TradeRequest {
    pub fn new(symbol: &str, side: TradeSide, quantity: f64, price: f64) -> Result<Self, ValidationError> {
        Ok(TradeRequest {
            symbol: symbol.to_string(),
            side,
            quantity: Quantity::new(quantity)?,
            price: Price::new(price)?,
        })
    }

    /// quantity × price
    pub fn gross_amount(&self) -> f64 {
        self.quantity.value() * self.price.value()
    }
}
