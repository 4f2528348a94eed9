//! Wallet entity - the per-user cash record trades settle against

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: i64,
    pub cash_balance: f64,
    /// Bumped on every write, used to detect concurrent settlements
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementKind {
    Deposit,
    Withdrawal,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Deposit => "DEPOSIT",
            MovementKind::Withdrawal => "WITHDRAWAL",
        }
    }
}

/// Cash added to or removed from a wallet outside of trading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletMovement {
    pub id: i64,
    pub user_id: i64,
    pub kind: MovementKind,
    pub amount: f64,
    pub balance_after: f64,
    pub created_at: DateTime<Utc>,
}
