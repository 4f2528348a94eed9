use crate::domain::entities::order::TradeSide;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An executed trade as recorded in the transaction history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeTransaction {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub gross_amount: f64,
    pub realized_pnl: Option<f64>,
    pub balance_after: f64,
    pub position_quantity_after: f64,
    pub average_cost_after: f64,
    pub executed_at: DateTime<Utc>,
}

/// Filter for transaction history queries
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub symbol: Option<String>,
    pub side: Option<TradeSide>,
    pub limit: Option<i64>,
}

impl HistoryFilter {
    pub const DEFAULT_LIMIT: i64 = 100;
    pub const MAX_LIMIT: i64 = 1000;

    /// Requested limit clamped to 1..=MAX_LIMIT
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(Self::DEFAULT_LIMIT)
            .clamp(1, Self::MAX_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit() {
        assert_eq!(HistoryFilter::default().effective_limit(), 100);
        let big = HistoryFilter {
            limit: Some(50_000),
            ..Default::default()
        };
        assert_eq!(big.effective_limit(), 1000);
        let zero = HistoryFilter {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(zero.effective_limit(), 1);
    }
}
