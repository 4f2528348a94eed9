//! Database Models
//!
//! Row types for every table, with conversions into domain entities.

use super::DatabaseError;
use crate::domain::entities::order::TradeSide;
use crate::domain::entities::position::Holding;
use crate::domain::entities::symbol::TradableSymbol;
use crate::domain::entities::transaction::TradeTransaction;
use crate::domain::entities::user::User;
use crate::domain::entities::wallet::{MovementKind, Wallet, WalletMovement};
use chrono::{DateTime, Utc};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

impl From<UserRecord> for User {
    fn from(record: UserRecord) -> Self {
        User {
            id: record.id,
            username: record.username,
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct WalletRecord {
    pub user_id: i64,
    pub cash_balance: f64,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl From<WalletRecord> for Wallet {
    fn from(record: WalletRecord) -> Self {
        Wallet {
            user_id: record.user_id,
            cash_balance: record.cash_balance,
            version: record.version,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct SymbolRecord {
    pub symbol: String,
    pub description: String,
    pub exchange: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<SymbolRecord> for TradableSymbol {
    fn from(record: SymbolRecord) -> Self {
        TradableSymbol {
            symbol: record.symbol,
            description: record.description,
            exchange: record.exchange,
            enabled: record.enabled,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct HoldingRecord {
    pub user_id: i64,
    pub symbol: String,
    pub quantity: f64,
    pub average_cost: f64,
    pub updated_at: DateTime<Utc>,
}

impl From<HoldingRecord> for Holding {
    fn from(record: HoldingRecord) -> Self {
        Holding {
            user_id: record.user_id,
            symbol: record.symbol,
            quantity: record.quantity,
            average_cost: record.average_cost,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct TransactionRecord {
    pub id: i64,
    pub user_id: i64,
    pub symbol: String,
    pub side: String, // "BUY" or "SELL"
    pub quantity: f64,
    pub price: f64,
    pub gross_amount: f64,
    pub realized_pnl: Option<f64>,
    pub balance_after: f64,
    pub position_quantity_after: f64,
    pub average_cost_after: f64,
    pub executed_at: DateTime<Utc>,
}

impl TryFrom<TransactionRecord> for TradeTransaction {
    type Error = DatabaseError;

    fn try_from(record: TransactionRecord) -> Result<Self, Self::Error> {
        let side: TradeSide = record.side.parse().map_err(|_| {
            DatabaseError::CorruptRow(format!(
                "transaction {} has unknown side '{}'",
                record.id, record.side
            ))
        })?;
        Ok(TradeTransaction {
            id: record.id,
            user_id: record.user_id,
            symbol: record.symbol,
            side,
            quantity: record.quantity,
            price: record.price,
            gross_amount: record.gross_amount,
            realized_pnl: record.realized_pnl,
            balance_after: record.balance_after,
            position_quantity_after: record.position_quantity_after,
            average_cost_after: record.average_cost_after,
            executed_at: record.executed_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct MovementRecord {
    pub id: i64,
    pub user_id: i64,
    pub kind: String, // "DEPOSIT" or "WITHDRAWAL"
    pub amount: f64,
    pub balance_after: f64,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<MovementRecord> for WalletMovement {
    type Error = DatabaseError;

    fn try_from(record: MovementRecord) -> Result<Self, Self::Error> {
        let kind = match record.kind.as_str() {
            "DEPOSIT" => MovementKind::Deposit,
            "WITHDRAWAL" => MovementKind::Withdrawal,
            other => {
                return Err(DatabaseError::CorruptRow(format!(
                    "wallet movement {} has unknown kind '{}'",
                    record.id, other
                )))
            }
        };
        Ok(WalletMovement {
            id: record.id,
            user_id: record.user_id,
            kind,
            amount: record.amount,
            balance_after: record.balance_after,
            created_at: record.created_at,
        })
    }
}

/// Whether an upsert created a new row or refreshed an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Outcome tally of a batch upsert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub inserted: usize,
    pub updated: usize,
}
