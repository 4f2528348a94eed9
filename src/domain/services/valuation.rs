//! Portfolio valuation - marks holdings to the latest known prices

use crate::domain::entities::position::Holding;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Latest price information available for a symbol
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkPrice {
    pub price: f64,
    pub day_change_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldingValuation {
    pub symbol: String,
    pub quantity: f64,
    pub average_cost: f64,
    pub last_price: f64,
    /// False when no price was known and the holding is marked at cost
    pub priced: bool,
    pub cost_basis: f64,
    pub market_value: f64,
    pub unrealized_pnl: f64,
    pub unrealized_pnl_percent: f64,
    pub day_change_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValuation {
    pub cash_balance: f64,
    pub holdings: Vec<HoldingValuation>,
    pub total_cost_basis: f64,
    pub total_market_value: f64,
    pub total_unrealized_pnl: f64,
    pub total_unrealized_pnl_percent: f64,
    /// cash + market value of all holdings
    pub total_value: f64,
}

fn percent_of(part: f64, whole: f64) -> f64 {
    if whole.abs() <= f64::EPSILON {
        0.0
    } else {
        part / whole * 100.0
    }
}

pub fn value_holding(holding: &Holding, mark: Option<MarkPrice>) -> HoldingValuation {
    let cost_basis = holding.quantity * holding.average_cost;
    let (last_price, priced, day_change_percent) = match mark {
        Some(mark) => (mark.price, true, mark.day_change_percent),
        None => (holding.average_cost, false, None),
    };
    let market_value = holding.quantity * last_price;
    let unrealized_pnl = market_value - cost_basis;

    HoldingValuation {
        symbol: holding.symbol.clone(),
        quantity: holding.quantity,
        average_cost: holding.average_cost,
        last_price,
        priced,
        cost_basis,
        market_value,
        unrealized_pnl,
        unrealized_pnl_percent: percent_of(unrealized_pnl, cost_basis),
        day_change_percent,
    }
}

/// Value every holding and aggregate totals. Holdings are returned sorted by symbol.
pub fn value_portfolio(
    cash_balance: f64,
    holdings: &[Holding],
    marks: &HashMap<String, MarkPrice>,
) -> PortfolioValuation {
    let mut valued: Vec<HoldingValuation> = holdings
        .iter()
        .map(|h| value_holding(h, marks.get(&h.symbol).copied()))
        .collect();
    valued.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let total_cost_basis: f64 = valued.iter().map(|h| h.cost_basis).sum();
    let total_market_value: f64 = valued.iter().map(|h| h.market_value).sum();
    let total_unrealized_pnl = total_market_value - total_cost_basis;

    PortfolioValuation {
        cash_balance,
        holdings: valued,
        total_cost_basis,
        total_market_value,
        total_unrealized_pnl,
        total_unrealized_pnl_percent: percent_of(total_unrealized_pnl, total_cost_basis),
        total_value: cash_balance + total_market_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holding(symbol: &str, quantity: f64, average_cost: f64) -> Holding {
        Holding {
            user_id: 1,
            symbol: symbol.to_string(),
            quantity,
            average_cost,
        }
    }

    #[test]
    fn test_value_holding_with_price() {
        let valued = value_holding(
            &holding("MSFT", 10.0, 300.0),
            Some(MarkPrice {
                price: 330.0,
                day_change_percent: Some(1.5),
            }),
        );

        assert_eq!(valued.cost_basis, 3_000.0);
        assert_eq!(valued.market_value, 3_300.0);
        assert_eq!(valued.unrealized_pnl, 300.0);
        assert!((valued.unrealized_pnl_percent - 10.0).abs() < 1e-9);
        assert_eq!(valued.day_change_percent, Some(1.5));
        assert!(valued.priced);
    }

    #[test]
    fn test_value_holding_without_price_marks_at_cost() {
        let valued = value_holding(&holding("XYZ", 4.0, 25.0), None);
        assert!(!valued.priced);
        assert_eq!(valued.last_price, 25.0);
        assert_eq!(valued.unrealized_pnl, 0.0);
        assert_eq!(valued.unrealized_pnl_percent, 0.0);
    }

    #[test]
    fn test_value_portfolio_totals_and_sorting() {
        let holdings = vec![holding("TSLA", 2.0, 200.0), holding("AAPL", 10.0, 100.0)];
        let mut marks = HashMap::new();
        marks.insert(
            "AAPL".to_string(),
            MarkPrice {
                price: 90.0,
                day_change_percent: None,
            },
        );
        marks.insert(
            "TSLA".to_string(),
            MarkPrice {
                price: 250.0,
                day_change_percent: Some(-2.0),
            },
        );

        let valuation = value_portfolio(1_000.0, &holdings, &marks);

        assert_eq!(valuation.holdings[0].symbol, "AAPL");
        assert_eq!(valuation.holdings[1].symbol, "TSLA");
        assert_eq!(valuation.total_cost_basis, 1_400.0);
        assert_eq!(valuation.total_market_value, 1_400.0);
        assert_eq!(valuation.total_unrealized_pnl, 0.0);
        assert_eq!(valuation.total_value, 2_400.0);
    }

    #[test]
    fn test_empty_portfolio() {
        let valuation = value_portfolio(500.0, &[], &HashMap::new());
        assert!(valuation.holdings.is_empty());
        assert_eq!(valuation.total_value, 500.0);
        assert_eq!(valuation.total_unrealized_pnl_percent, 0.0);
    }
}
