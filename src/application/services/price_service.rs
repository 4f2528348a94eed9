use crate::domain::entities::quote::PriceTick;
use crate::domain::errors::TradingError;
use crate::domain::repositories::quote_provider::{QuoteError, QuoteProvider};
use crate::domain::services::listener_registry::ListenerRegistry;
use crate::domain::services::price_cache::{CachedPrice, PriceCache};
use crate::domain::services::valuation::MarkPrice;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Outcome of one polling round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: Vec<String>,
    /// Ticks handed to listeners across all symbols
    pub delivered: usize,
}

/// Last prices for trading, valuation and streaming
pub struct PriceService {
    provider: Arc<dyn QuoteProvider>,
    cache: Arc<PriceCache>,
    registry: Arc<ListenerRegistry>,
    ttl: Duration,
}

impl PriceService {
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        cache: Arc<PriceCache>,
        registry: Arc<ListenerRegistry>,
        ttl: Duration,
    ) -> Self {
        Self {
            provider,
            cache,
            registry,
            ttl,
        }
    }

    pub fn cache(&self) -> Arc<PriceCache> {
        self.cache.clone()
    }

    pub fn registry(&self) -> Arc<ListenerRegistry> {
        self.registry.clone()
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Latest price of `symbol`
    ///
    /// A fresh cache entry is served as is. Otherwise the provider is asked,
    /// and if that fails a stale entry is still better than nothing.
    pub async fn current_price(&self, symbol: &str) -> Result<CachedPrice, TradingError> {
        if let Some(entry) = self.cache.get_fresh(symbol, self.ttl) {
            return Ok(entry);
        }

        match self.provider.fetch_quote(symbol).await {
            Ok(quote) => {
                let entry = self.cache.apply_quote(&quote);
                debug!("Fetched {} from {}: {:.4}", symbol, self.provider.name(), entry.price);
                Ok(entry)
            }
            Err(QuoteError::SymbolNotFound(_)) => Err(TradingError::PriceUnavailable {
                symbol: symbol.to_string(),
                reason: "unknown to the quote provider".to_string(),
            }),
            Err(e) => match self.cache.get(symbol) {
                Some(stale) => {
                    warn!(
                        "Quote fetch for {} failed ({}), serving price from {}",
                        symbol, e, stale.updated_at
                    );
                    Ok(stale)
                }
                None => Err(TradingError::PriceUnavailable {
                    symbol: symbol.to_string(),
                    reason: e.to_string(),
                }),
            },
        }
    }

    /// Mark prices for valuation. Symbols without any price are left out.
    pub async fn mark_prices(&self, symbols: &[String]) -> HashMap<String, MarkPrice> {
        let mut marks = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            match self.current_price(symbol).await {
                Ok(entry) => {
                    marks.insert(
                        symbol.clone(),
                        MarkPrice {
                            price: entry.price,
                            day_change_percent: entry.percent_change,
                        },
                    );
                }
                Err(e) => debug!("No mark price for {}: {}", symbol, e),
            }
        }
        marks
    }

    /// Poll the provider for `symbols` and push the results to listeners
    pub async fn refresh(&self, symbols: &[String]) -> RefreshReport {
        let mut report = RefreshReport::default();
        for symbol in symbols {
            match self.provider.fetch_quote(symbol).await {
                Ok(quote) => {
                    let entry = self.cache.apply_quote(&quote);
                    let tick = PriceTick {
                        symbol: entry.symbol.clone(),
                        price: entry.price,
                        volume: None,
                        percent_change: entry.percent_change,
                        timestamp: entry.updated_at,
                    };
                    report.delivered += self.registry.dispatch(&tick).delivered;
                    report.refreshed += 1;
                }
                Err(e) => {
                    debug!("Refresh of {} failed: {}", symbol, e);
                    report.failed.push(symbol.clone());
                }
            }
        }
        report
    }

    /// Listen to ticks of `symbol`; dropping the receiver unsubscribes
    pub fn subscribe(&self, symbol: &str) -> mpsc::Receiver<PriceTick> {
        self.registry.subscribe(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::quote::Quote;
    use crate::domain::entities::symbol::SymbolListing;
    use crate::domain::repositories::quote_provider::QuoteResult;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Returns 100 + call count, or a network error while `down` is set
    struct CountingProvider {
        calls: AtomicUsize,
        down: AtomicBool,
    }

    impl CountingProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                down: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl QuoteProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        async fn fetch_quote(&self, symbol: &str) -> QuoteResult<Quote> {
            if symbol == "NOPE" {
                return Err(QuoteError::SymbolNotFound(symbol.to_string()));
            }
            if self.down.load(Ordering::SeqCst) {
                return Err(QuoteError::Network("offline".to_string()));
            }
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(Quote {
                symbol: symbol.to_string(),
                price: 100.0 + n as f64,
                change: None,
                percent_change: None,
                previous_close: Some(100.0),
                timestamp: Utc::now(),
            })
        }

        async fn list_symbols(&self, _exchange: &str) -> QuoteResult<Vec<SymbolListing>> {
            Ok(Vec::new())
        }
    }

    fn service(provider: Arc<CountingProvider>, ttl: Duration) -> PriceService {
        PriceService::new(
            provider,
            Arc::new(PriceCache::new()),
            Arc::new(ListenerRegistry::default()),
            ttl,
        )
    }

    #[tokio::test]
    async fn test_fresh_cache_is_served_without_fetch() {
        let provider = Arc::new(CountingProvider::new());
        let prices = service(provider.clone(), Duration::from_secs(60));

        let first = prices.current_price("AAPL").await.unwrap();
        let second = prices.current_price("AAPL").await.unwrap();

        assert_eq!(first.price, 101.0);
        assert_eq!(second.price, 101.0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.percent_change, Some(1.0));
    }

    #[tokio::test]
    async fn test_expired_cache_refetches() {
        let provider = Arc::new(CountingProvider::new());
        let prices = service(provider.clone(), Duration::ZERO);

        prices.current_price("AAPL").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = prices.current_price("AAPL").await.unwrap();

        assert_eq!(second.price, 102.0);
    }

    #[tokio::test]
    async fn test_stale_price_served_when_provider_down() {
        let provider = Arc::new(CountingProvider::new());
        let prices = service(provider.clone(), Duration::ZERO);

        prices.current_price("AAPL").await.unwrap();
        provider.down.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(prices.current_price("AAPL").await.unwrap().price, 101.0);
        assert!(matches!(
            prices.current_price("MSFT").await,
            Err(TradingError::PriceUnavailable { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_unavailable() {
        let prices = service(Arc::new(CountingProvider::new()), Duration::from_secs(60));
        let err = prices.current_price("NOPE").await.unwrap_err();
        assert_eq!(err.code(), "PRICE_UNAVAILABLE");
    }

    #[tokio::test]
    async fn test_refresh_dispatches_ticks() {
        let prices = service(Arc::new(CountingProvider::new()), Duration::from_secs(60));
        let mut listener = prices.subscribe("AAPL");

        let report = prices
            .refresh(&["AAPL".to_string(), "NOPE".to_string()])
            .await;

        assert_eq!(report.refreshed, 1);
        assert_eq!(report.failed, vec!["NOPE".to_string()]);
        assert_eq!(report.delivered, 1);
        let tick = listener.recv().await.unwrap();
        assert_eq!(tick.price, 101.0);
        assert_eq!(tick.percent_change, Some(1.0));
    }

    #[tokio::test]
    async fn test_mark_prices_skip_unpriced() {
        let prices = service(Arc::new(CountingProvider::new()), Duration::from_secs(60));
        let marks = prices
            .mark_prices(&["AAPL".to_string(), "NOPE".to_string()])
            .await;
        assert_eq!(marks.len(), 1);
        assert_eq!(marks["AAPL"].price, 101.0);
    }
}
