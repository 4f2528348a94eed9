//! Persistence Layer
//!
//! SQLite storage for users, wallets, the symbol universe, holdings and the
//! trade history, with async access through sqlx.
//!
//! # Database Schema
//!
//! ## users
//! - id, username (unique, case-insensitive), created_at
//!
//! ## wallets
//! - user_id (1:1 with users), cash_balance, version, updated_at
//!
//! ## symbols
//! - symbol (PK), description, exchange, enabled, created_at, updated_at
//!
//! ## holdings
//! - (user_id, symbol) PK, quantity (> 0), average_cost, updated_at
//!
//! ## transactions
//! - id, user_id, symbol, side ("BUY" | "SELL"), quantity, price,
//!   gross_amount, realized_pnl, balance_after, position_quantity_after,
//!   average_cost_after, executed_at
//!
//! ## wallet_movements
//! - id, user_id, kind ("DEPOSIT" | "WITHDRAWAL"), amount, balance_after, created_at

pub mod ledger;
pub mod models;
pub mod repository;

use crate::domain::errors::TradingError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Database busy: {0}")]
    Busy(String),
}

impl DatabaseError {
    /// Map a sqlx error raised by a query, keeping unique violations distinct
    pub fn from_query(context: &str, error: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_error) = &error {
            if db_error.is_unique_violation() {
                return DatabaseError::UniqueViolation(format!("{}: {}", context, db_error));
            }
            if is_busy_code(db_error.code().as_deref()) {
                return DatabaseError::Busy(format!("{}: {}", context, db_error));
            }
        }
        DatabaseError::QueryError(format!("{}: {}", context, error))
    }

    /// Lock contention with another connection; the statement may succeed later
    pub fn is_busy(&self) -> bool {
        matches!(self, DatabaseError::Busy(_))
    }
}

/// SQLITE_BUSY (5) or SQLITE_LOCKED (6), including their extended codes
fn is_busy_code(code: Option<&str>) -> bool {
    code.and_then(|c| c.parse::<i32>().ok())
        .map(|c| matches!(c & 0xff, 5 | 6))
        .unwrap_or(false)
}

impl From<DatabaseError> for TradingError {
    fn from(error: DatabaseError) -> Self {
        TradingError::Storage(error.to_string())
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Initialize the database connection pool and run migrations
///
/// In-memory databases are pinned to a single long-lived connection, since
/// every SQLite connection to `:memory:` would otherwise see its own database.
pub async fn init_database(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", config.url);

    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if !is_in_memory(db_path) {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
                    })?;
                }
            }
        }
    }

    let statement_level = if config.log_queries {
        tracing::log::LevelFilter::Debug
    } else {
        tracing::log::LevelFilter::Trace
    };

    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5))
        .log_statements(statement_level);

    let pool = if is_in_memory(&config.url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?
    };

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");
    Ok(pool)
}

/// Open a fresh in-memory database with the full schema
pub async fn init_memory_database() -> Result<DbPool, DatabaseError> {
    init_database(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        log_queries: false,
    })
    .await
}

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "users",
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE COLLATE NOCASE,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "wallets",
        r#"
        CREATE TABLE IF NOT EXISTS wallets (
            user_id INTEGER PRIMARY KEY,
            cash_balance REAL NOT NULL CHECK(cash_balance >= 0),
            version INTEGER NOT NULL DEFAULT 0,
            updated_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        )
        "#,
    ),
    (
        "symbols",
        r#"
        CREATE TABLE IF NOT EXISTS symbols (
            symbol TEXT PRIMARY KEY,
            description TEXT NOT NULL DEFAULT '',
            exchange TEXT NOT NULL DEFAULT '',
            enabled BOOLEAN NOT NULL DEFAULT 0,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "holdings",
        r#"
        CREATE TABLE IF NOT EXISTS holdings (
            user_id INTEGER NOT NULL,
            symbol TEXT NOT NULL,
            quantity REAL NOT NULL CHECK(quantity > 0),
            average_cost REAL NOT NULL CHECK(average_cost >= 0),
            updated_at DATETIME NOT NULL,
            PRIMARY KEY (user_id, symbol),
            FOREIGN KEY (user_id) REFERENCES users(id)
        )
        "#,
    ),
    (
        "transactions",
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('BUY', 'SELL')),
            quantity REAL NOT NULL,
            price REAL NOT NULL,
            gross_amount REAL NOT NULL,
            realized_pnl REAL,
            balance_after REAL NOT NULL,
            position_quantity_after REAL NOT NULL,
            average_cost_after REAL NOT NULL,
            executed_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        )
        "#,
    ),
    (
        "wallet_movements",
        r#"
        CREATE TABLE IF NOT EXISTS wallet_movements (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            kind TEXT NOT NULL CHECK(kind IN ('DEPOSIT', 'WITHDRAWAL')),
            amount REAL NOT NULL,
            balance_after REAL NOT NULL,
            created_at DATETIME NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id)
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_symbols_enabled ON symbols(enabled)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_user_time ON transactions(user_id, executed_at)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_symbol ON transactions(symbol)",
    "CREATE INDEX IF NOT EXISTS idx_movements_user ON wallet_movements(user_id, created_at)",
];

async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    for (table, ddl) in MIGRATIONS {
        sqlx::query(ddl).execute(pool).await.map_err(|e| {
            DatabaseError::MigrationError(format!("Failed to create {} table: {}", table, e))
        })?;
    }

    for ddl in INDEXES {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;
    }

    info!("✓ Database migrations completed successfully");
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/stocksim.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Log statements at debug level
    pub log_queries: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/stocksim.db".to_string(),
            max_connections: 5,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("DATABASE_URL").unwrap_or(defaults.url);

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| (1..=64).contains(n))
            .unwrap_or(defaults.max_connections);

        let log_queries = std::env::var("DATABASE_LOG_QUERIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.log_queries);

        Self {
            url,
            max_connections,
            log_queries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_database_init() {
        let pool = init_memory_database().await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn test_migrations_create_all_tables() {
        let pool = init_memory_database().await.unwrap();

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN \
             ('users', 'wallets', 'symbols', 'holdings', 'transactions', 'wallet_movements')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(result.0, 6);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = init_memory_database().await.unwrap();
        assert!(run_migrations(&pool).await.is_ok());
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.url, "sqlite://data/stocksim.db");
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_in_memory_detection() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite://file:test?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite://data/stocksim.db"));
    }

    #[test]
    fn test_busy_codes() {
        assert!(is_busy_code(Some("5")));
        assert!(is_busy_code(Some("517")));
        assert!(is_busy_code(Some("262")));
        assert!(!is_busy_code(Some("2067")));
        assert!(!is_busy_code(Some("SQLITE_ERROR")));
        assert!(!is_busy_code(None));
    }
}
