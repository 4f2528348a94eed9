//! In-memory last price / percent change cache, keyed by symbol

use crate::domain::entities::quote::{PriceTick, Quote};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPrice {
    pub symbol: String,
    pub price: f64,
    pub previous_close: Option<f64>,
    pub percent_change: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl CachedPrice {
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.updated_at) <= ttl,
            Err(_) => true,
        }
    }
}

fn percent_change(price: f64, previous_close: Option<f64>) -> Option<f64> {
    previous_close
        .filter(|pc| *pc > 0.0)
        .map(|pc| (price - pc) / pc * 100.0)
}

#[derive(Debug, Default)]
pub struct PriceCache {
    entries: RwLock<HashMap<String, CachedPrice>>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a full quote. Previous close and percent change come from the quote.
    pub fn apply_quote(&self, quote: &Quote) -> CachedPrice {
        let previous_close = quote.previous_close.filter(|pc| *pc > 0.0);
        let entry = CachedPrice {
            symbol: quote.symbol.clone(),
            price: quote.price,
            previous_close,
            percent_change: quote
                .percent_change
                .or_else(|| percent_change(quote.price, previous_close)),
            updated_at: quote.timestamp,
        };
        self.write(entry.clone());
        entry
    }

    /// Store a last-trade price. Percent change is recomputed against the
    /// previous close already known for the symbol, if any.
    pub fn apply_trade(&self, symbol: &str, price: f64, at: DateTime<Utc>) -> CachedPrice {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous_close = entries.get(symbol).and_then(|e| e.previous_close);
        let entry = CachedPrice {
            symbol: symbol.to_string(),
            price,
            previous_close,
            percent_change: percent_change(price, previous_close),
            updated_at: at,
        };
        entries.insert(symbol.to_string(), entry.clone());
        entry
    }

    /// Apply a streamed tick and return it enriched with the cached percent change
    pub fn apply_tick(&self, tick: &PriceTick) -> PriceTick {
        let entry = self.apply_trade(&tick.symbol, tick.price, tick.timestamp);
        PriceTick {
            percent_change: entry.percent_change,
            ..tick.clone()
        }
    }

    pub fn get(&self, symbol: &str) -> Option<CachedPrice> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(symbol).cloned()
    }

    pub fn get_fresh(&self, symbol: &str, ttl: Duration) -> Option<CachedPrice> {
        self.get(symbol).filter(|e| e.is_fresh(ttl, Utc::now()))
    }

    pub fn snapshot(&self) -> HashMap<String, CachedPrice> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.clone()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self, entry: CachedPrice) {
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.insert(entry.symbol.clone(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quote(symbol: &str, price: f64, previous_close: f64) -> Quote {
        Quote {
            symbol: symbol.to_string(),
            price,
            change: Some(price - previous_close),
            percent_change: None,
            previous_close: Some(previous_close),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_apply_quote_computes_percent_change() {
        let cache = PriceCache::new();
        let entry = cache.apply_quote(&quote("AAPL", 110.0, 100.0));
        assert_eq!(entry.percent_change.map(|p| (p * 1e6).round() / 1e6), Some(10.0));
        assert_eq!(cache.get("AAPL").unwrap().price, 110.0);
    }

    #[test]
    fn test_trade_uses_known_previous_close() {
        let cache = PriceCache::new();
        cache.apply_quote(&quote("AAPL", 100.0, 100.0));
        let entry = cache.apply_trade("AAPL", 95.0, Utc::now());

        assert_eq!(entry.previous_close, Some(100.0));
        assert!((entry.percent_change.unwrap() + 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_trade_without_previous_close() {
        let cache = PriceCache::new();
        let entry = cache.apply_trade("NEW", 12.0, Utc::now());
        assert_eq!(entry.percent_change, None);
    }

    #[test]
    fn test_apply_tick_enriches_percent_change() {
        let cache = PriceCache::new();
        cache.apply_quote(&quote("TSLA", 200.0, 200.0));
        let tick = PriceTick {
            symbol: "TSLA".to_string(),
            price: 210.0,
            volume: Some(3.0),
            percent_change: None,
            timestamp: Utc::now(),
        };
        let enriched = cache.apply_tick(&tick);
        assert!((enriched.percent_change.unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(enriched.volume, Some(3.0));
    }

    #[test]
    fn test_freshness() {
        let cache = PriceCache::new();
        let stale_at = Utc::now() - chrono::Duration::seconds(120);
        cache.apply_trade("IBM", 140.0, stale_at);

        assert!(cache.get_fresh("IBM", Duration::from_secs(60)).is_none());
        assert!(cache.get_fresh("IBM", Duration::from_secs(600)).is_some());
        assert!(cache.get_fresh("MISSING", Duration::from_secs(600)).is_none());
    }
}
