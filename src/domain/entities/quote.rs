use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A full quote as returned by a REST quote endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub change: Option<f64>,
    pub percent_change: Option<f64>,
    pub previous_close: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// A single last-trade update pushed to listeners
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTick {
    pub symbol: String,
    pub price: f64,
    pub volume: Option<f64>,
    pub percent_change: Option<f64>,
    pub timestamp: DateTime<Utc>,
}
