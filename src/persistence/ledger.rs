//! Trade Ledger
//!
//! Atomic settlement of trades and cash movements. Every write that touches
//! a wallet goes through here, inside one SQLite transaction, and bumps the
//! wallet version. An update that finds a different version than the one it
//! read fails with `ConcurrentModification` and leaves nothing behind.
//!
//! Each transaction takes the SQLite write lock with its first statement, so
//! writers on other connections queue on `busy_timeout` instead of failing a
//! read-to-write upgrade. Lock contention that outlasts the timeout is also
//! reported as `ConcurrentModification`.

use super::models::{HoldingRecord, MovementRecord, TransactionRecord, WalletRecord};
use super::{DatabaseError, DbPool};
use crate::domain::entities::order::TradeRequest;
use crate::domain::entities::position::PositionState;
use crate::domain::entities::transaction::TradeTransaction;
use crate::domain::entities::wallet::{MovementKind, Wallet, WalletMovement};
use crate::domain::errors::TradingError;
use crate::domain::services::order_executor::execute_trade;
use crate::domain::value_objects::money::{snap_to_zero, Amount, EPSILON};
use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use tracing::{debug, info, warn};

/// Result of a settled trade
#[derive(Debug, Clone)]
pub struct Settlement {
    pub transaction: TradeTransaction,
    pub wallet: Wallet,
    pub position: PositionState,
}

#[derive(Clone)]
pub struct TradeLedger {
    pool: DbPool,
}

impl TradeLedger {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Settle `trade` for `user_id` in one database transaction
    ///
    /// # Errors
    /// - `UserNotFound` when the user has no wallet
    /// - `InsufficientFunds` / `InsufficientShares` from the executor
    /// - `ConcurrentModification` when the wallet changed under us or the
    ///   database stayed locked
    pub async fn settle_trade(
        &self,
        user_id: i64,
        trade: &TradeRequest,
    ) -> Result<Settlement, TradingError> {
        let mut tx = begin_write(&self.pool, user_id).await?;

        let wallet = load_wallet(&mut tx, user_id).await?;

        let holding = sqlx::query_as::<_, HoldingRecord>(
            "SELECT * FROM holdings WHERE user_id = ?1 AND symbol = ?2",
        )
        .bind(user_id)
        .bind(&trade.symbol)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage(user_id, "Failed to read holding"))?;

        let position = holding
            .as_ref()
            .map(|h| PositionState::new(h.quantity, h.average_cost))
            .unwrap_or_else(PositionState::flat);

        let outcome = execute_trade(wallet.cash_balance, &position, trade)?;
        let now = Utc::now();

        let updated_wallet =
            write_wallet(&mut tx, &wallet, outcome.cash_balance, now).await?;

        if outcome.position_closed || outcome.position.is_flat() {
            sqlx::query("DELETE FROM holdings WHERE user_id = ?1 AND symbol = ?2")
                .bind(user_id)
                .bind(&trade.symbol)
                .execute(&mut *tx)
                .await
                .map_err(storage(user_id, "Failed to close holding"))?;
        } else {
            sqlx::query(
                r#"
                INSERT INTO holdings (user_id, symbol, quantity, average_cost, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(user_id, symbol) DO UPDATE SET
                    quantity = excluded.quantity,
                    average_cost = excluded.average_cost,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(user_id)
            .bind(&trade.symbol)
            .bind(outcome.position.quantity)
            .bind(outcome.position.average_cost)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage(user_id, "Failed to write holding"))?;
        }

        let record = sqlx::query_as::<_, TransactionRecord>(
            r#"
            INSERT INTO transactions (
                user_id, symbol, side, quantity, price, gross_amount, realized_pnl,
                balance_after, position_quantity_after, average_cost_after, executed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&trade.symbol)
        .bind(trade.side.as_str())
        .bind(trade.quantity.value())
        .bind(trade.price.value())
        .bind(outcome.gross_amount)
        .bind(outcome.realized_pnl)
        .bind(outcome.cash_balance)
        .bind(outcome.position.quantity)
        .bind(outcome.position.average_cost)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage(user_id, "Failed to record transaction"))?;

        tx.commit()
            .await
            .map_err(storage(user_id, "Failed to commit"))?;

        info!(
            "Settled {} {} {} @ {:.4} for user {} (balance {:.2})",
            trade.side,
            trade.quantity.value(),
            trade.symbol,
            trade.price.value(),
            user_id,
            outcome.cash_balance
        );

        Ok(Settlement {
            transaction: TradeTransaction::try_from(record)?,
            wallet: updated_wallet.into(),
            position: outcome.position,
        })
    }

    /// Apply a deposit or withdrawal and record it
    pub async fn record_cash_movement(
        &self,
        user_id: i64,
        kind: MovementKind,
        amount: Amount,
    ) -> Result<(Wallet, WalletMovement), TradingError> {
        let mut tx = begin_write(&self.pool, user_id).await?;
        let wallet = load_wallet(&mut tx, user_id).await?;

        let new_balance = match kind {
            MovementKind::Deposit => wallet.cash_balance + amount.value(),
            MovementKind::Withdrawal => {
                if amount.value() > wallet.cash_balance + EPSILON {
                    return Err(TradingError::InsufficientFunds {
                        required: amount.value(),
                        available: wallet.cash_balance,
                    });
                }
                snap_to_zero(wallet.cash_balance - amount.value())
            }
        };

        let now = Utc::now();
        let updated = write_wallet(&mut tx, &wallet, new_balance, now).await?;

        let movement = sqlx::query_as::<_, MovementRecord>(
            r#"
            INSERT INTO wallet_movements (user_id, kind, amount, balance_after, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(amount.value())
        .bind(new_balance)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage(user_id, "Failed to record wallet movement"))?;

        tx.commit()
            .await
            .map_err(storage(user_id, "Failed to commit"))?;

        debug!(
            "{} of {:.2} for user {} (balance {:.2})",
            kind.as_str(),
            amount.value(),
            user_id,
            new_balance
        );

        Ok((updated.into(), WalletMovement::try_from(movement)?))
    }
}

/// Map a query failure, turning lock contention into a retryable conflict
fn storage(user_id: i64, context: &'static str) -> impl FnOnce(sqlx::Error) -> TradingError {
    move |e| {
        let error = DatabaseError::from_query(context, e);
        if error.is_busy() {
            warn!("Wallet of user {} is locked: {}", user_id, error);
            TradingError::ConcurrentModification(user_id)
        } else {
            error.into()
        }
    }
}

/// Begin a transaction and take the write lock right away
async fn begin_write(
    pool: &DbPool,
    user_id: i64,
) -> Result<Transaction<'static, Sqlite>, TradingError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(storage(user_id, "Failed to begin transaction"))?;
    sqlx::query("UPDATE wallets SET updated_at = updated_at WHERE user_id = ?1")
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(storage(user_id, "Failed to lock wallet"))?;
    Ok(tx)
}

async fn load_wallet(
    tx: &mut Transaction<'static, Sqlite>,
    user_id: i64,
) -> Result<WalletRecord, TradingError> {
    sqlx::query_as::<_, WalletRecord>("SELECT * FROM wallets WHERE user_id = ?1")
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(storage(user_id, "Failed to read wallet"))?
        .ok_or(TradingError::UserNotFound(user_id))
}

/// Version-guarded balance update
async fn write_wallet(
    tx: &mut Transaction<'static, Sqlite>,
    read: &WalletRecord,
    new_balance: f64,
    now: chrono::DateTime<Utc>,
) -> Result<WalletRecord, TradingError> {
    let user_id = read.user_id;
    let updated = sqlx::query_as::<_, WalletRecord>(
        r#"
        UPDATE wallets
        SET cash_balance = ?1, version = version + 1, updated_at = ?2
        WHERE user_id = ?3 AND version = ?4
        RETURNING *
        "#,
    )
    .bind(new_balance)
    .bind(now)
    .bind(read.user_id)
    .bind(read.version)
    .fetch_optional(&mut **tx)
    .await
    .map_err(storage(user_id, "Failed to update wallet"))?;

    match updated {
        Some(wallet) => Ok(wallet),
        None => {
            warn!(
                "Wallet of user {} moved past version {}",
                read.user_id, read.version
            );
            Err(TradingError::ConcurrentModification(read.user_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::order::TradeSide;
    use crate::persistence::{init_database, init_memory_database, DatabaseConfig};
    use crate::persistence::repository::{HoldingRepository, TransactionRepository, UserRepository};
    use crate::domain::entities::transaction::HistoryFilter;

    async fn setup(balance: f64) -> (DbPool, i64) {
        let pool = init_memory_database().await.unwrap();
        let (user, _) = UserRepository::new(pool.clone())
            .create_with_wallet("trader", balance)
            .await
            .unwrap();
        (pool, user.id)
    }

    fn order(side: TradeSide, quantity: f64, price: f64) -> TradeRequest {
        TradeRequest::new("AAPL", side, quantity, price).unwrap()
    }

    #[tokio::test]
    async fn test_buy_then_sell_updates_wallet_and_holding() {
        let (pool, user_id) = setup(10_000.0).await;
        let ledger = TradeLedger::new(pool.clone());
        let holdings = HoldingRepository::new(pool);

        let buy = ledger
            .settle_trade(user_id, &order(TradeSide::Buy, 10.0, 100.0))
            .await
            .unwrap();
        assert_eq!(buy.wallet.cash_balance, 9_000.0);
        assert_eq!(buy.wallet.version, 1);
        assert_eq!(buy.transaction.side, TradeSide::Buy);

        let second = ledger
            .settle_trade(user_id, &order(TradeSide::Buy, 10.0, 200.0))
            .await
            .unwrap();
        assert_eq!(second.position.quantity, 20.0);
        assert!((second.position.average_cost - 150.0).abs() < 1e-9);

        let sell = ledger
            .settle_trade(user_id, &order(TradeSide::Sell, 5.0, 180.0))
            .await
            .unwrap();
        assert_eq!(sell.transaction.realized_pnl, Some(150.0));
        assert!((sell.position.average_cost - 150.0).abs() < 1e-9);

        let stored = holdings.get(user_id, "AAPL").await.unwrap().unwrap();
        assert_eq!(stored.quantity, 15.0);
    }

    #[tokio::test]
    async fn test_selling_everything_deletes_holding() {
        let (pool, user_id) = setup(1_000.0).await;
        let ledger = TradeLedger::new(pool.clone());

        ledger
            .settle_trade(user_id, &order(TradeSide::Buy, 2.0, 50.0))
            .await
            .unwrap();
        let sell = ledger
            .settle_trade(user_id, &order(TradeSide::Sell, 2.0, 60.0))
            .await
            .unwrap();

        assert!(sell.position.is_flat());
        assert_eq!(sell.wallet.cash_balance, 1_020.0);
        assert!(HoldingRepository::new(pool).get(user_id, "AAPL").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_trade_writes_nothing() {
        let (pool, user_id) = setup(100.0).await;
        let ledger = TradeLedger::new(pool.clone());

        let err = ledger
            .settle_trade(user_id, &order(TradeSide::Buy, 2.0, 60.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::InsufficientFunds { .. }));

        let err = ledger
            .settle_trade(user_id, &order(TradeSide::Sell, 1.0, 60.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::InsufficientShares { .. }));

        let history = TransactionRepository::new(pool)
            .list(user_id, &HistoryFilter::default())
            .await
            .unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user() {
        let (pool, _) = setup(100.0).await;
        let ledger = TradeLedger::new(pool);

        let err = ledger
            .settle_trade(999, &order(TradeSide::Buy, 1.0, 1.0))
            .await
            .unwrap_err();
        assert_eq!(err, TradingError::UserNotFound(999));
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let (pool, user_id) = setup(100.0).await;
        let mut tx = pool.begin().await.unwrap();
        let mut wallet = load_wallet(&mut tx, user_id).await.unwrap();
        wallet.version += 1;

        let err = write_wallet(&mut tx, &wallet, 50.0, Utc::now()).await.unwrap_err();
        assert_eq!(err, TradingError::ConcurrentModification(user_id));
    }

    #[tokio::test]
    async fn test_cash_movements() {
        let (pool, user_id) = setup(100.0).await;
        let ledger = TradeLedger::new(pool);

        let (wallet, movement) = ledger
            .record_cash_movement(user_id, MovementKind::Deposit, Amount::new(50.0).unwrap())
            .await
            .unwrap();
        assert_eq!(wallet.cash_balance, 150.0);
        assert_eq!(movement.balance_after, 150.0);

        let (wallet, _) = ledger
            .record_cash_movement(user_id, MovementKind::Withdrawal, Amount::new(150.0).unwrap())
            .await
            .unwrap();
        assert_eq!(wallet.cash_balance, 0.0);

        let err = ledger
            .record_cash_movement(user_id, MovementKind::Withdrawal, Amount::new(0.01).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, TradingError::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn test_distinct_users_settle_concurrently_on_file_database() {
        let path = std::env::temp_dir().join(format!(
            "stocksim-ledger-{}-{}.db",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let pool = init_database(&DatabaseConfig {
            url: format!("sqlite://{}", path.display()),
            max_connections: 5,
            log_queries: false,
        })
        .await
        .unwrap();

        let users = UserRepository::new(pool.clone());
        let mut user_ids = Vec::new();
        for i in 0..8 {
            let (user, _) = users
                .create_with_wallet(&format!("trader{}", i), 10_000.0)
                .await
                .unwrap();
            user_ids.push(user.id);
        }

        let ledger = TradeLedger::new(pool.clone());
        let mut tasks = Vec::new();
        for &user_id in &user_ids {
            let ledger = ledger.clone();
            tasks.push(tokio::spawn(async move {
                let mut errors = Vec::new();
                for _ in 0..25 {
                    if let Err(e) = ledger
                        .settle_trade(user_id, &order(TradeSide::Buy, 1.0, 10.0))
                        .await
                    {
                        errors.push(e);
                    }
                }
                errors
            }));
        }
        for task in tasks {
            let errors = task.await.unwrap();
            assert!(errors.is_empty(), "settlement failed: {:?}", errors.first());
        }

        let holdings = HoldingRepository::new(pool.clone());
        for &user_id in &user_ids {
            let holding = holdings.get(user_id, "AAPL").await.unwrap().unwrap();
            assert_eq!(holding.quantity, 25.0);
        }
        let wallet: (f64, i64) =
            sqlx::query_as("SELECT cash_balance, version FROM wallets WHERE user_id = ?1")
                .bind(user_ids[0])
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(wallet, (9_750.0, 25));

        pool.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
