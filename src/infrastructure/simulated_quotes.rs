//! Offline quote provider
//!
//! Each symbol follows a bounded random walk around a base price. Every
//! `fetch_quote` advances the walk one step, so polling it produces a live
//! looking feed without network access or an API key.

use crate::domain::entities::quote::Quote;
use crate::domain::entities::symbol::SymbolListing;
use crate::domain::repositories::quote_provider::{QuoteError, QuoteProvider, QuoteResult};
use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Mutex;

/// Built-in universe: (symbol, description, base price)
const SIMULATED_UNIVERSE: &[(&str, &str, f64)] = &[
    ("AAPL", "APPLE INC", 190.0),
    ("MSFT", "MICROSOFT CORP", 410.0),
    ("GOOGL", "ALPHABET INC-CL A", 165.0),
    ("AMZN", "AMAZON.COM INC", 180.0),
    ("NVDA", "NVIDIA CORP", 120.0),
    ("TSLA", "TESLA INC", 240.0),
    ("META", "META PLATFORMS INC-CLASS A", 500.0),
    ("NFLX", "NETFLIX INC", 650.0),
    ("AMD", "ADVANCED MICRO DEVICES", 160.0),
    ("INTC", "INTEL CORP", 30.0),
    ("JPM", "JPMORGAN CHASE & CO", 200.0),
    ("V", "VISA INC-CLASS A SHARES", 270.0),
    ("KO", "COCA-COLA CO/THE", 62.0),
    ("DIS", "WALT DISNEY CO/THE", 95.0),
    ("BRK.B", "BERKSHIRE HATHAWAY INC-CL B", 420.0),
];

/// The walk never leaves [base / BAND, base * BAND]
const BAND: f64 = 2.0;

#[derive(Debug, Clone, Copy)]
struct Walk {
    base: f64,
    previous_close: f64,
    price: f64,
}

pub struct SimulatedQuoteProvider {
    volatility: f64,
    walks: Mutex<HashMap<String, Walk>>,
    rng: Mutex<StdRng>,
}

impl SimulatedQuoteProvider {
    pub fn new(volatility: f64) -> Self {
        Self::with_rng(volatility, StdRng::from_entropy())
    }

    /// Deterministic provider for tests
    pub fn seeded(volatility: f64, seed: u64) -> Self {
        Self::with_rng(volatility, StdRng::seed_from_u64(seed))
    }

    fn with_rng(volatility: f64, rng: StdRng) -> Self {
        let walks = SIMULATED_UNIVERSE
            .iter()
            .map(|(symbol, _, base)| {
                (
                    symbol.to_string(),
                    Walk {
                        base: *base,
                        previous_close: *base,
                        price: *base,
                    },
                )
            })
            .collect();
        Self {
            volatility: volatility.clamp(0.0, 0.2),
            walks: Mutex::new(walks),
            rng: Mutex::new(rng),
        }
    }

    /// Whether `symbol` has a walk, either built in or started by a fetch
    pub fn knows(&self, symbol: &str) -> bool {
        SIMULATED_UNIVERSE.iter().any(|(s, _, _)| *s == symbol)
            || self.lock_walks().contains_key(symbol)
    }

    fn lock_walks(&self) -> std::sync::MutexGuard<'_, HashMap<String, Walk>> {
        match self.walks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn next_step(&self) -> f64 {
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_range(-1.0..=1.0)
    }

    fn advance(&self, symbol: &str) -> Walk {
        let step = self.next_step();
        let mut walks = self.lock_walks();
        let walk = walks.entry(symbol.to_string()).or_insert_with(|| {
            let base = base_price_for(symbol);
            Walk {
                base,
                previous_close: base,
                price: base,
            }
        });

        let moved = walk.price * (1.0 + self.volatility * step);
        walk.price = moved.clamp(walk.base / BAND, walk.base * BAND);
        *walk
    }
}

/// Stable pseudo base price in [20, 500) for symbols outside the built-in universe
fn base_price_for(symbol: &str) -> f64 {
    let hash = symbol
        .bytes()
        .fold(5381u64, |acc, b| acc.wrapping_mul(33).wrapping_add(b as u64));
    20.0 + (hash % 48_000) as f64 / 100.0
}

#[async_trait]
impl QuoteProvider for SimulatedQuoteProvider {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn fetch_quote(&self, symbol: &str) -> QuoteResult<Quote> {
        if symbol.trim().is_empty() {
            return Err(QuoteError::SymbolNotFound(symbol.to_string()));
        }
        let walk = self.advance(symbol);
        let change = walk.price - walk.previous_close;
        Ok(Quote {
            symbol: symbol.to_string(),
            price: walk.price,
            change: Some(change),
            percent_change: Some(change / walk.previous_close * 100.0),
            previous_close: Some(walk.previous_close),
            timestamp: Utc::now(),
        })
    }

    async fn list_symbols(&self, exchange: &str) -> QuoteResult<Vec<SymbolListing>> {
        Ok(SIMULATED_UNIVERSE
            .iter()
            .map(|(symbol, description, _)| SymbolListing {
                symbol: symbol.to_string(),
                description: description.to_string(),
                exchange: exchange.to_string(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_walk_stays_within_band() {
        let provider = SimulatedQuoteProvider::seeded(0.2, 7);
        for _ in 0..500 {
            let quote = provider.fetch_quote("AAPL").await.unwrap();
            assert!(quote.price >= 190.0 / BAND && quote.price <= 190.0 * BAND);
            assert_eq!(quote.previous_close, Some(190.0));
        }
    }

    #[tokio::test]
    async fn test_seeded_providers_agree() {
        let a = SimulatedQuoteProvider::seeded(0.01, 42);
        let b = SimulatedQuoteProvider::seeded(0.01, 42);
        for _ in 0..10 {
            assert_eq!(
                a.fetch_quote("MSFT").await.unwrap().price,
                b.fetch_quote("MSFT").await.unwrap().price
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_symbol_gets_stable_base() {
        let provider = SimulatedQuoteProvider::seeded(0.01, 1);
        assert!(!provider.knows("ZZZ"));

        let quote = provider.fetch_quote("ZZZ").await.unwrap();
        let base = base_price_for("ZZZ");
        assert!((20.0..500.0).contains(&base));
        assert_eq!(quote.previous_close, Some(base));
        assert!(provider.knows("ZZZ"));
    }

    #[tokio::test]
    async fn test_percent_change_matches_previous_close() {
        let provider = SimulatedQuoteProvider::seeded(0.05, 3);
        let quote = provider.fetch_quote("TSLA").await.unwrap();
        let expected = (quote.price - 240.0) / 240.0 * 100.0;
        assert!((quote.percent_change.unwrap() - expected).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_list_symbols_tags_exchange() {
        let provider = SimulatedQuoteProvider::new(0.01);
        let listings = provider.list_symbols("US").await.unwrap();
        assert_eq!(listings.len(), SIMULATED_UNIVERSE.len());
        assert!(listings.iter().all(|l| l.exchange == "US"));
    }
}
