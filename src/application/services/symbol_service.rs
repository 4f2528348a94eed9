use crate::application::actors::price_stream::PriceStreamHandle;
use crate::domain::entities::symbol::{normalize_symbol, SymbolListing, TradableSymbol};
use crate::domain::errors::TradingError;
use crate::domain::repositories::quote_provider::QuoteProvider;
use crate::persistence::repository::SymbolRepository;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Counts returned by an import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub exchange: String,
    pub fetched: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Listings whose ticker failed normalization
    pub skipped: usize,
}

fn validate_exchange(raw: &str) -> Result<String, TradingError> {
    let exchange = raw.trim().to_uppercase();
    if exchange.is_empty()
        || exchange.len() > 10
        || !exchange.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return Err(TradingError::InvalidInput(format!(
            "Invalid exchange code: '{}'",
            raw
        )));
    }
    Ok(exchange)
}

/// The symbol universe and its enabled flags
pub struct SymbolService {
    repo: SymbolRepository,
    provider: Arc<dyn QuoteProvider>,
    stream: RwLock<Option<PriceStreamHandle>>,
}

impl SymbolService {
    pub fn new(repo: SymbolRepository, provider: Arc<dyn QuoteProvider>) -> Self {
        Self {
            repo,
            provider,
            stream: RwLock::new(None),
        }
    }

    /// Route future enable/disable toggles to the upstream stream
    pub async fn attach_stream(&self, handle: PriceStreamHandle) {
        *self.stream.write().await = Some(handle);
    }

    /// Insert the default symbols as enabled. Rows that already exist keep
    /// their flag. Returns the number of new rows.
    pub async fn seed(&self, defaults: &[String]) -> Result<usize, TradingError> {
        let mut listings = Vec::with_capacity(defaults.len());
        for raw in defaults {
            match normalize_symbol(raw) {
                Ok(symbol) => listings.push(SymbolListing {
                    symbol,
                    description: String::new(),
                    exchange: String::new(),
                }),
                Err(e) => warn!("Skipping default symbol: {}", e),
            }
        }
        let inserted = self.repo.upsert_listings(&listings, true).await?.inserted;
        info!("Seeded {} new symbol(s) out of {} default(s)", inserted, defaults.len());
        Ok(inserted)
    }

    /// Pull the listing of `exchange` from the provider. New symbols arrive
    /// disabled; existing ones keep their flag and get a fresh description.
    pub async fn import(&self, exchange: &str) -> Result<ImportSummary, TradingError> {
        let exchange = validate_exchange(exchange)?;
        let listings = self.provider.list_symbols(&exchange).await.map_err(|e| {
            TradingError::PriceUnavailable {
                symbol: exchange.clone(),
                reason: format!("symbol listing failed: {}", e),
            }
        })?;

        let mut summary = ImportSummary {
            exchange: exchange.clone(),
            fetched: listings.len(),
            ..ImportSummary::default()
        };

        let mut valid = Vec::with_capacity(listings.len());
        for listing in listings {
            match normalize_symbol(&listing.symbol) {
                Ok(symbol) => valid.push(SymbolListing { symbol, ..listing }),
                Err(_) => summary.skipped += 1,
            }
        }
        let counts = self.repo.upsert_listings(&valid, false).await?;
        summary.inserted = counts.inserted;
        summary.updated = counts.updated;

        info!(
            "Imported {} from {}: {} fetched, {} new, {} updated, {} skipped",
            exchange,
            self.provider.name(),
            summary.fetched,
            summary.inserted,
            summary.updated,
            summary.skipped
        );
        Ok(summary)
    }

    pub async fn set_enabled(&self, raw: &str, enabled: bool) -> Result<TradableSymbol, TradingError> {
        let symbol = normalize_symbol(raw)?;
        if !self.repo.set_enabled(&symbol, enabled).await? {
            return Err(TradingError::SymbolNotFound(symbol));
        }

        if let Some(stream) = self.stream.read().await.as_ref() {
            let result = if enabled {
                stream.subscribe(&symbol).await
            } else {
                stream.unsubscribe(&symbol).await
            };
            if let Err(e) = result {
                warn!("Stream not updated for {}: {}", symbol, e);
            }
        }

        info!("Symbol {} {}", symbol, if enabled { "enabled" } else { "disabled" });
        self.get(&symbol).await
    }

    pub async fn get(&self, raw: &str) -> Result<TradableSymbol, TradingError> {
        let symbol = normalize_symbol(raw)?;
        self.repo
            .get(&symbol)
            .await?
            .map(TradableSymbol::from)
            .ok_or(TradingError::SymbolNotFound(symbol))
    }

    pub async fn list(&self, enabled_only: bool) -> Result<Vec<TradableSymbol>, TradingError> {
        Ok(self
            .repo
            .list(enabled_only)
            .await?
            .into_iter()
            .map(TradableSymbol::from)
            .collect())
    }

    pub async fn enabled_symbols(&self) -> Result<Vec<String>, TradingError> {
        Ok(self
            .repo
            .list(true)
            .await?
            .into_iter()
            .map(|record| record.symbol)
            .collect())
    }

    /// Resolve `raw` to a symbol that may be traded right now
    pub async fn require_tradable(&self, raw: &str) -> Result<TradableSymbol, TradingError> {
        let symbol = self.get(raw).await?;
        if !symbol.enabled {
            return Err(TradingError::SymbolDisabled(symbol.symbol));
        }
        Ok(symbol)
    }
}
