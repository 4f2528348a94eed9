use crate::application::services::price_service::PriceService;
use crate::application::services::symbol_service::SymbolService;
use crate::application::services::user_locks::UserLocks;
use crate::domain::entities::order::{TradeRequest, TradeSide};
use crate::domain::entities::position::PositionState;
use crate::domain::entities::symbol::normalize_symbol;
use crate::domain::entities::transaction::{HistoryFilter, TradeTransaction};
use crate::domain::errors::TradingError;
use crate::domain::value_objects::quantity::Quantity;
use crate::persistence::ledger::TradeLedger;
use crate::persistence::repository::{TransactionRepository, UserRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Retries after the first settlement attempt hits a conflict
pub const MAX_SETTLEMENT_RETRIES: u32 = 3;

/// Pause before retry `attempt` (1-based)
pub(crate) fn conflict_backoff(attempt: u32) -> Duration {
    Duration::from_millis(25 * u64::from(attempt))
}

/// A market order as submitted by a user
#[derive(Debug, Clone, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub quantity: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderReceipt {
    pub transaction: TradeTransaction,
    pub cash_balance: f64,
    pub position: PositionState,
}

pub struct TradingService {
    users: UserRepository,
    symbols: Arc<SymbolService>,
    prices: Arc<PriceService>,
    ledger: TradeLedger,
    transactions: TransactionRepository,
    locks: Arc<UserLocks>,
}

impl TradingService {
    pub fn new(
        users: UserRepository,
        symbols: Arc<SymbolService>,
        prices: Arc<PriceService>,
        ledger: TradeLedger,
        transactions: TransactionRepository,
        locks: Arc<UserLocks>,
    ) -> Self {
        Self {
            users,
            symbols,
            prices,
            ledger,
            transactions,
            locks,
        }
    }

    /// Execute a market order at the current price
    ///
    /// # Errors
    /// - `InvalidInput` for a bad quantity or symbol
    /// - `UserNotFound`, `SymbolNotFound`, `SymbolDisabled`
    /// - `PriceUnavailable` when no price can be obtained
    /// - `InsufficientFunds` / `InsufficientShares`
    /// - `ConcurrentModification` when every retry lost the race
    pub async fn place_order(&self, user_id: i64, order: OrderRequest) -> Result<OrderReceipt, TradingError> {
        let quantity = Quantity::new(order.quantity)?;
        if self.users.get(user_id).await?.is_none() {
            return Err(TradingError::UserNotFound(user_id));
        }
        let symbol = self.symbols.require_tradable(&order.symbol).await?.symbol;
        let price = self.prices.current_price(&symbol).await?;

        let trade = TradeRequest::new(&symbol, order.side, quantity.value(), price.price)?;

        let _guard = self.locks.lock(user_id).await;
        let mut retries = 0;
        let settlement = loop {
            match self.ledger.settle_trade(user_id, &trade).await {
                Err(TradingError::ConcurrentModification(_)) if retries < MAX_SETTLEMENT_RETRIES => {
                    retries += 1;
                    warn!(
                        "Settlement conflict for user {} on {}, retry {}/{}",
                        user_id, symbol, retries, MAX_SETTLEMENT_RETRIES
                    );
                    tokio::time::sleep(conflict_backoff(retries)).await;
                }
                other => break other?,
            }
        };

        info!(
            "Order filled: user {} {} {} {} @ {:.4}",
            user_id,
            trade.side,
            quantity.value(),
            symbol,
            price.price
        );

        Ok(OrderReceipt {
            cash_balance: settlement.wallet.cash_balance,
            position: settlement.position,
            transaction: settlement.transaction,
        })
    }

    /// Trade history, newest first
    pub async fn history(&self, user_id: i64, mut filter: HistoryFilter) -> Result<Vec<TradeTransaction>, TradingError> {
        if self.users.get(user_id).await?.is_none() {
            return Err(TradingError::UserNotFound(user_id));
        }
        if let Some(symbol) = filter.symbol.take() {
            filter.symbol = Some(normalize_symbol(&symbol)?);
        }
        self.transactions
            .list(user_id, &filter)
            .await?
            .into_iter()
            .map(|record| TradeTransaction::try_from(record).map_err(TradingError::from))
            .collect()
    }
}
