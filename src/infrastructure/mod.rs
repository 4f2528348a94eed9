pub mod finnhub_client;
pub mod quote_provider_factory;
pub mod simulated_quotes;
