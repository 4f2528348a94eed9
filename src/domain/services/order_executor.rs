//! Order execution and average-cost position accounting
//!
//! Pure arithmetic over a wallet balance and a position. Persistence and
//! locking live in the ledger; this module only decides what the new state is
//! and whether the trade is allowed.

use crate::domain::entities::order::{TradeRequest, TradeSide};
use crate::domain::entities::position::PositionState;
use crate::domain::errors::TradingError;
use crate::domain::value_objects::money::{snap_to_zero, EPSILON};
use serde::{Deserialize, Serialize};

/// Wallet and position state after a trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub cash_balance: f64,
    pub position: PositionState,
    /// quantity × price
    pub gross_amount: f64,
    /// (price − average cost) × quantity, only for sells
    pub realized_pnl: Option<f64>,
    /// True when a sell took the position to zero
    pub position_closed: bool,
}

/// Apply `trade` to a wallet holding `cash_balance` and an existing `position`.
///
/// # Errors
/// - `InsufficientFunds` when a buy costs more than the balance
/// - `InsufficientShares` when a sell exceeds the held quantity
pub fn execute_trade(
    cash_balance: f64,
    position: &PositionState,
    trade: &TradeRequest,
) -> Result<ExecutionOutcome, TradingError> {
    match trade.side {
        TradeSide::Buy => execute_buy(cash_balance, position, trade),
        TradeSide::Sell => execute_sell(cash_balance, position, trade),
    }
}

fn execute_buy(
    cash_balance: f64,
    position: &PositionState,
    trade: &TradeRequest,
) -> Result<ExecutionOutcome, TradingError> {
    let quantity = trade.quantity.value();
    let price = trade.price.value();
    let cost = quantity * price;

    if cost > cash_balance + EPSILON {
        return Err(TradingError::InsufficientFunds {
            required: cost,
            available: cash_balance,
        });
    }

    let held = if position.is_flat() { 0.0 } else { position.quantity };
    let new_quantity = held + quantity;
    let new_average = (held * position.average_cost + quantity * price) / new_quantity;

    Ok(ExecutionOutcome {
        cash_balance: snap_to_zero(cash_balance - cost),
        position: PositionState::new(new_quantity, new_average),
        gross_amount: cost,
        realized_pnl: None,
        position_closed: false,
    })
}

fn execute_sell(
    cash_balance: f64,
    position: &PositionState,
    trade: &TradeRequest,
) -> Result<ExecutionOutcome, TradingError> {
    let quantity = trade.quantity.value();
    let price = trade.price.value();

    if quantity > position.quantity + EPSILON {
        return Err(TradingError::InsufficientShares {
            symbol: trade.symbol.clone(),
            requested: quantity,
            held: position.quantity.max(0.0),
        });
    }

    let proceeds = quantity * price;
    let realized = (price - position.average_cost) * quantity;
    let remaining = snap_to_zero(position.quantity - quantity);

    // Average cost survives a partial sell and resets once flat
    let (new_position, closed) = if remaining <= EPSILON {
        (PositionState::flat(), true)
    } else {
        (PositionState::new(remaining, position.average_cost), false)
    };

    Ok(ExecutionOutcome {
        cash_balance: cash_balance + proceeds,
        position: new_position,
        gross_amount: proceeds,
        realized_pnl: Some(realized),
        position_closed: closed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buy(quantity: f64, price: f64) -> TradeRequest {
        TradeRequest::new("AAPL", TradeSide::Buy, quantity, price).unwrap()
    }

    fn sell(quantity: f64, price: f64) -> TradeRequest {
        TradeRequest::new("AAPL", TradeSide::Sell, quantity, price).unwrap()
    }

    #[test]
    fn test_buy_opens_position() {
        let outcome = execute_trade(10_000.0, &PositionState::flat(), &buy(10.0, 150.0)).unwrap();

        assert_eq!(outcome.cash_balance, 8_500.0);
        assert_eq!(outcome.position.quantity, 10.0);
        assert_eq!(outcome.position.average_cost, 150.0);
        assert_eq!(outcome.gross_amount, 1_500.0);
        assert!(outcome.realized_pnl.is_none());
        assert!(!outcome.position_closed);
    }

    #[test]
    fn test_buy_averages_cost_basis() {
        let position = PositionState::new(10.0, 100.0);
        let outcome = execute_trade(5_000.0, &position, &buy(30.0, 120.0)).unwrap();

        // (10 × 100 + 30 × 120) / 40 = 115
        assert_eq!(outcome.position.quantity, 40.0);
        assert!((outcome.position.average_cost - 115.0).abs() < 1e-9);
        assert_eq!(outcome.cash_balance, 1_400.0);
    }

    #[test]
    fn test_buy_with_exact_balance() {
        let outcome = execute_trade(1_000.0, &PositionState::flat(), &buy(8.0, 125.0)).unwrap();
        assert_eq!(outcome.cash_balance, 0.0);
    }

    #[test]
    fn test_buy_with_float_dust_balance() {
        // 0.1 + 0.2 style drift must not block spending the whole balance
        let balance = 0.1 + 0.2;
        let outcome = execute_trade(balance, &PositionState::flat(), &buy(3.0, 0.1)).unwrap();
        assert_eq!(outcome.cash_balance, 0.0);
    }

    #[test]
    fn test_buy_insufficient_funds() {
        let err = execute_trade(999.99, &PositionState::flat(), &buy(8.0, 125.0)).unwrap_err();
        assert_eq!(
            err,
            TradingError::InsufficientFunds {
                required: 1_000.0,
                available: 999.99,
            }
        );
    }

    #[test]
    fn test_partial_sell_keeps_average_cost() {
        let position = PositionState::new(20.0, 50.0);
        let outcome = execute_trade(100.0, &position, &sell(5.0, 60.0)).unwrap();

        assert_eq!(outcome.position.quantity, 15.0);
        assert_eq!(outcome.position.average_cost, 50.0);
        assert_eq!(outcome.cash_balance, 400.0);
        assert_eq!(outcome.realized_pnl, Some(50.0));
        assert!(!outcome.position_closed);
    }

    #[test]
    fn test_full_sell_resets_position() {
        let position = PositionState::new(20.0, 50.0);
        let outcome = execute_trade(0.0, &position, &sell(20.0, 40.0)).unwrap();

        assert_eq!(outcome.position, PositionState::flat());
        assert!(outcome.position_closed);
        assert_eq!(outcome.cash_balance, 800.0);
        assert_eq!(outcome.realized_pnl, Some(-200.0));
    }

    #[test]
    fn test_sell_more_than_held() {
        let position = PositionState::new(2.0, 50.0);
        let err = execute_trade(0.0, &position, &sell(3.0, 40.0)).unwrap_err();
        assert_eq!(
            err,
            TradingError::InsufficientShares {
                symbol: "AAPL".to_string(),
                requested: 3.0,
                held: 2.0,
            }
        );
    }

    #[test]
    fn test_sell_without_position() {
        let err = execute_trade(100.0, &PositionState::flat(), &sell(1.0, 10.0)).unwrap_err();
        assert!(matches!(err, TradingError::InsufficientShares { held, .. } if held == 0.0));
    }

    #[test]
    fn test_rebuy_after_close_starts_fresh_average() {
        let closed = execute_trade(0.0, &PositionState::new(5.0, 10.0), &sell(5.0, 12.0)).unwrap();
        let reopened = execute_trade(closed.cash_balance, &closed.position, &buy(2.0, 30.0)).unwrap();

        assert_eq!(reopened.position.quantity, 2.0);
        assert_eq!(reopened.position.average_cost, 30.0);
    }

    #[test]
    fn test_fractional_shares_close_within_tolerance() {
        let position = PositionState::new(0.1 + 0.2, 100.0);
        let outcome = execute_trade(0.0, &position, &sell(0.3, 100.0)).unwrap();
        assert!(outcome.position_closed);
        assert_eq!(outcome.position.quantity, 0.0);
    }
}
