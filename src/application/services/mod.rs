pub mod portfolio_service;
pub mod price_service;
pub mod symbol_service;
pub mod trading_service;
pub mod user_locks;
pub mod user_service;
pub mod wallet_service;

pub use portfolio_service::PortfolioService;
pub use price_service::PriceService;
pub use symbol_service::SymbolService;
pub use trading_service::TradingService;
pub use user_locks::UserLocks;
pub use user_service::UserService;
pub use wallet_service::WalletService;
