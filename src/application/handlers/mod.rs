pub mod error;
pub mod health;
pub mod orders;
pub mod portfolio;
pub mod prices;
pub mod symbols;
pub mod users;
pub mod wallet;

pub use error::{ApiError, ErrorResponse};

use crate::application::actors::PriceStreamHandle;
use crate::application::services::{
    PortfolioService, PriceService, SymbolService, TradingService, UserLocks, UserService,
    WalletService,
};
use crate::auth::{require_auth, ApiKeyStore};
use crate::config::SimulatorConfig;
use crate::domain::repositories::quote_provider::QuoteProvider;
use crate::domain::services::listener_registry::ListenerRegistry;
use crate::domain::services::price_cache::PriceCache;
use crate::persistence::ledger::TradeLedger;
use crate::persistence::repository::{
    HoldingRepository, SymbolRepository, TransactionRepository, UserRepository, WalletRepository,
};
use crate::persistence::DbPool;
use crate::rate_limit::{
    create_rate_limiter, rate_limit_middleware, CallerRateLimit, KeyedRateLimiter, RateLimiterConfig,
};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Everything the handlers need, cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserService>,
    pub wallets: Arc<WalletService>,
    pub trading: Arc<TradingService>,
    pub portfolio: Arc<PortfolioService>,
    pub symbols: Arc<SymbolService>,
    pub prices: Arc<PriceService>,
    pub rate_limiter: KeyedRateLimiter,
    pub stream: Option<PriceStreamHandle>,
}

impl AppState {
    /// Wire the services on top of one database pool and one quote provider
    pub fn new(pool: DbPool, provider: Arc<dyn QuoteProvider>, config: &SimulatorConfig) -> Self {
        let locks = Arc::new(UserLocks::new());
        let ledger = TradeLedger::new(pool.clone());

        let prices = Arc::new(PriceService::new(
            provider.clone(),
            Arc::new(PriceCache::new()),
            Arc::new(ListenerRegistry::default()),
            config.price_cache_ttl(),
        ));
        let symbols = Arc::new(SymbolService::new(SymbolRepository::new(pool.clone()), provider));

        let users = Arc::new(UserService::new(
            UserRepository::new(pool.clone()),
            config.initial_wallet_balance,
        ));
        let wallets = Arc::new(WalletService::new(
            WalletRepository::new(pool.clone()),
            ledger.clone(),
            locks.clone(),
        ));
        let trading = Arc::new(TradingService::new(
            UserRepository::new(pool.clone()),
            symbols.clone(),
            prices.clone(),
            ledger,
            TransactionRepository::new(pool.clone()),
            locks,
        ));
        let portfolio = Arc::new(PortfolioService::new(
            HoldingRepository::new(pool.clone()),
            WalletRepository::new(pool),
            prices.clone(),
        ));

        Self {
            users,
            wallets,
            trading,
            portfolio,
            symbols,
            prices,
            rate_limiter: create_rate_limiter(RateLimiterConfig {
                requests_per_minute: config.rate_limit_per_minute,
            }),
            stream: None,
        }
    }

    /// Hand the upstream stream to the symbol service and the health check
    pub async fn attach_stream(&mut self, handle: PriceStreamHandle) {
        self.symbols.attach_stream(handle.clone()).await;
        self.stream = Some(handle);
    }
}

/// The REST and SSE surface
///
/// `/health` stays outside API-key gating and rate limiting.
pub fn router(state: AppState, config: &SimulatorConfig) -> Router {
    let keys = Arc::new(ApiKeyStore::from_keys(&config.api_keys));
    let limiter = CallerRateLimit::new(state.rate_limiter.clone(), keys.clone());

    let api = Router::new()
        .route("/api/users", post(users::register))
        .route("/api/users/:id", get(users::get_user))
        .route("/api/users/:id/wallet", get(wallet::get_wallet))
        .route("/api/users/:id/wallet/deposit", post(wallet::deposit))
        .route("/api/users/:id/wallet/withdraw", post(wallet::withdraw))
        .route("/api/users/:id/wallet/movements", get(wallet::movements))
        .route("/api/users/:id/orders", post(orders::place_order))
        .route("/api/users/:id/transactions", get(orders::transactions))
        .route("/api/users/:id/holdings", get(portfolio::holdings))
        .route("/api/users/:id/portfolio", get(portfolio::valuation))
        .route("/api/symbols", get(symbols::list_symbols))
        .route("/api/symbols/import", post(symbols::import_symbols))
        .route("/api/symbols/:symbol", get(symbols::get_symbol))
        .route("/api/symbols/:symbol/enabled", put(symbols::set_enabled))
        .route("/api/prices/:symbol", get(prices::get_price))
        .route("/api/prices/:symbol/stream", get(prices::stream_prices))
        .layer(middleware::from_fn_with_state(keys, require_auth))
        .layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(api)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
