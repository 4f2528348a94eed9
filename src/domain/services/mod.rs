pub mod listener_registry;
pub mod order_executor;
pub mod price_cache;
pub mod valuation;
