//! Database Repository
//!
//! Data access for users, wallets, symbols, holdings and history.
//! Multi-row writes that must be atomic live in `ledger`.

use super::models::*;
use super::{DatabaseError, DbPool};
use crate::domain::entities::symbol::SymbolListing;
use crate::domain::entities::transaction::HistoryFilter;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::{debug, error};

#[derive(Clone)]
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create a user and their wallet in one transaction
    pub async fn create_with_wallet(
        &self,
        username: &str,
        initial_balance: f64,
    ) -> Result<(UserRecord, WalletRecord), DatabaseError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (username, created_at) VALUES (?1, ?2) RETURNING *",
        )
        .bind(username)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to create user", e))?;

        let wallet = sqlx::query_as::<_, WalletRecord>(
            r#"
            INSERT INTO wallets (user_id, cash_balance, version, updated_at)
            VALUES (?1, ?2, 0, ?3)
            RETURNING *
            "#,
        )
        .bind(user.id)
        .bind(initial_balance)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to create wallet", e))?;

        tx.commit().await?;

        debug!("Created user {} ({}) with wallet", user.id, user.username);
        Ok((user, wallet))
    }

    pub async fn get(&self, id: i64) -> Result<Option<UserRecord>, DatabaseError> {
        sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to get user {}: {}", id, e);
                DatabaseError::from_query("Failed to get user", e)
            })
    }

    /// Case-insensitive lookup
    pub async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>, DatabaseError> {
        sqlx::query_as::<_, UserRecord>("SELECT * FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_query("Failed to find user", e))
    }
}

#[derive(Clone)]
pub struct WalletRepository {
    pool: DbPool,
}

impl WalletRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: i64) -> Result<Option<WalletRecord>, DatabaseError> {
        sqlx::query_as::<_, WalletRecord>("SELECT * FROM wallets WHERE user_id = ?1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to get wallet of user {}: {}", user_id, e);
                DatabaseError::from_query("Failed to get wallet", e)
            })
    }

    /// Most recent cash movements first
    pub async fn movements(&self, user_id: i64, limit: i64) -> Result<Vec<MovementRecord>, DatabaseError> {
        sqlx::query_as::<_, MovementRecord>(
            "SELECT * FROM wallet_movements WHERE user_id = ?1 ORDER BY created_at DESC, id DESC LIMIT ?2",
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to list wallet movements", e))
    }
}

#[derive(Clone)]
pub struct SymbolRepository {
    pool: DbPool,
}

impl SymbolRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a listing if new (with `enabled_if_new`), otherwise refresh its
    /// description and exchange. The enabled flag of existing rows is kept.
    pub async fn upsert_listing(
        &self,
        listing: &SymbolListing,
        enabled_if_new: bool,
    ) -> Result<UpsertOutcome, DatabaseError> {
        let mut conn = self.pool.acquire().await?;
        upsert_listing_on(&mut conn, listing, enabled_if_new, Utc::now()).await
    }

    /// [`Self::upsert_listing`] over a whole batch, committed as one transaction
    pub async fn upsert_listings(
        &self,
        listings: &[SymbolListing],
        enabled_if_new: bool,
    ) -> Result<UpsertCounts, DatabaseError> {
        let now = Utc::now();
        let mut counts = UpsertCounts::default();
        let mut tx = self.pool.begin().await?;
        for listing in listings {
            match upsert_listing_on(&mut tx, listing, enabled_if_new, now).await? {
                UpsertOutcome::Inserted => counts.inserted += 1,
                UpsertOutcome::Updated => counts.updated += 1,
            }
        }
        tx.commit().await?;
        debug!(
            "Upserted {} symbol(s): {} new, {} updated",
            listings.len(),
            counts.inserted,
            counts.updated
        );
        Ok(counts)
    }

    pub async fn get(&self, symbol: &str) -> Result<Option<SymbolRecord>, DatabaseError> {
        sqlx::query_as::<_, SymbolRecord>("SELECT * FROM symbols WHERE symbol = ?1")
            .bind(symbol)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_query("Failed to get symbol", e))
    }

    pub async fn list(&self, enabled_only: bool) -> Result<Vec<SymbolRecord>, DatabaseError> {
        let query = if enabled_only {
            "SELECT * FROM symbols WHERE enabled = 1 ORDER BY symbol"
        } else {
            "SELECT * FROM symbols ORDER BY symbol"
        };
        sqlx::query_as::<_, SymbolRecord>(query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_query("Failed to list symbols", e))
    }

    /// Returns false when the symbol does not exist
    pub async fn set_enabled(&self, symbol: &str, enabled: bool) -> Result<bool, DatabaseError> {
        let rows = sqlx::query("UPDATE symbols SET enabled = ?1, updated_at = ?2 WHERE symbol = ?3")
            .bind(enabled)
            .bind(Utc::now())
            .bind(symbol)
            .execute(&self.pool)
            .await
            .map_err(|e| DatabaseError::from_query("Failed to toggle symbol", e))?
            .rows_affected();

        debug!("Symbol {} enabled={} (rows: {})", symbol, enabled, rows);
        Ok(rows > 0)
    }
}

async fn upsert_listing_on(
    conn: &mut SqliteConnection,
    listing: &SymbolListing,
    enabled_if_new: bool,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome, DatabaseError> {
    let inserted = sqlx::query(
        r#"
        INSERT INTO symbols (symbol, description, exchange, enabled, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?5)
        ON CONFLICT(symbol) DO NOTHING
        "#,
    )
    .bind(&listing.symbol)
    .bind(&listing.description)
    .bind(&listing.exchange)
    .bind(enabled_if_new)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| DatabaseError::from_query("Failed to insert symbol", e))?
    .rows_affected();

    if inserted > 0 {
        return Ok(UpsertOutcome::Inserted);
    }

    sqlx::query(
        r#"
        UPDATE symbols
        SET description = CASE WHEN ?2 = '' THEN description ELSE ?2 END,
            exchange = CASE WHEN ?3 = '' THEN exchange ELSE ?3 END,
            updated_at = ?4
        WHERE symbol = ?1
        "#,
    )
    .bind(&listing.symbol)
    .bind(&listing.description)
    .bind(&listing.exchange)
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(|e| DatabaseError::from_query("Failed to update symbol", e))?;

    Ok(UpsertOutcome::Updated)
}

#[derive(Clone)]
pub struct HoldingRepository {
    pool: DbPool,
}

impl HoldingRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: i64, symbol: &str) -> Result<Option<HoldingRecord>, DatabaseError> {
        sqlx::query_as::<_, HoldingRecord>(
            "SELECT * FROM holdings WHERE user_id = ?1 AND symbol = ?2",
        )
        .bind(user_id)
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to get holding", e))
    }

    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<HoldingRecord>, DatabaseError> {
        sqlx::query_as::<_, HoldingRecord>(
            "SELECT * FROM holdings WHERE user_id = ?1 ORDER BY symbol",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DatabaseError::from_query("Failed to list holdings", e))
    }
}

#[derive(Clone)]
pub struct TransactionRepository {
    pool: DbPool,
}

impl TransactionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Newest first, optionally narrowed by symbol and side
    pub async fn list(
        &self,
        user_id: i64,
        filter: &HistoryFilter,
    ) -> Result<Vec<TransactionRecord>, DatabaseError> {
        sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT * FROM transactions
            WHERE user_id = ?1
              AND (?2 IS NULL OR symbol = ?2)
              AND (?3 IS NULL OR side = ?3)
            ORDER BY executed_at DESC, id DESC
            LIMIT ?4
            "#,
        )
        .bind(user_id)
        .bind(filter.symbol.as_deref())
        .bind(filter.side.map(|s| s.as_str()))
        .bind(filter.effective_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to list transactions of user {}: {}", user_id, e);
            DatabaseError::from_query("Failed to list transactions", e)
        })
    }
}
