//! Finnhub REST client
//!
//! Quotes come from `GET /quote?symbol=S` and the importable universe from
//! `GET /stock/symbol?exchange=E`. The API key travels in the
//! `X-Finnhub-Token` header and never appears in a URL or an error message.
//! Finnhub answers an unknown symbol with an all-zero quote rather than a 404.

use crate::config::SimulatorConfig;
use crate::domain::entities::quote::Quote;
use crate::domain::entities::symbol::SymbolListing;
use crate::domain::repositories::quote_provider::{QuoteError, QuoteProvider, QuoteResult};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const FINNHUB_API_BASE: &str = "https://finnhub.io/api/v1";
pub const TOKEN_HEADER: &str = "X-Finnhub-Token";

#[derive(Debug, Clone)]
pub struct FinnhubConfig {
    pub api_base: String,
    pub api_key: String,
    pub timeout: Duration,
}

impl FinnhubConfig {
    pub fn new(api_key: &str) -> Self {
        Self {
            api_base: FINNHUB_API_BASE.to_string(),
            api_key: api_key.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn from_simulator_config(config: &SimulatorConfig) -> Result<Self, QuoteError> {
        let api_key = config
            .finnhub_api_key
            .clone()
            .ok_or_else(|| QuoteError::NotConfigured("FINNHUB_API_KEY is not set".to_string()))?;
        Ok(Self {
            api_base: config.finnhub_rest_url.trim_end_matches('/').to_string(),
            api_key,
            timeout: config.http_timeout(),
        })
    }
}

/// `/quote` payload
#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    /// Current price
    c: f64,
    /// Change
    d: Option<f64>,
    /// Percent change
    dp: Option<f64>,
    /// Previous close
    pc: Option<f64>,
    /// Unix seconds
    #[serde(default)]
    t: i64,
}

/// `/stock/symbol` entry
#[derive(Debug, Deserialize)]
struct FinnhubSymbol {
    symbol: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "displaySymbol", default)]
    display_symbol: String,
}

pub struct FinnhubClient {
    client: Client,
    config: FinnhubConfig,
}

impl FinnhubClient {
    pub fn new(config: FinnhubConfig) -> Result<Self, QuoteError> {
        if config.api_key.trim().is_empty() {
            return Err(QuoteError::NotConfigured("empty Finnhub API key".to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| QuoteError::NotConfigured(format!("HTTP client: {}", e)))?;

        info!("Finnhub client targeting {}", config.api_base);
        Ok(Self { client, config })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> QuoteResult<T> {
        let url = format!("{}{}", self.config.api_base, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .header(TOKEN_HEADER, self.config.api_key.as_str())
            .send()
            .await
            .map_err(|e| QuoteError::Network(format!("GET {}: {}", path, e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    QuoteError::Rejected(format!("{} (check FINNHUB_API_KEY)", status))
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    QuoteError::Rejected("rate limited by Finnhub".to_string())
                }
                _ => QuoteError::Network(format!("GET {} returned {}: {}", path, status, body)),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| QuoteError::InvalidResponse(format!("GET {}: {}", path, e.without_url())))
    }
}

fn into_quote(symbol: &str, raw: FinnhubQuote) -> QuoteResult<Quote> {
    if !raw.c.is_finite() || raw.c <= 0.0 {
        return Err(QuoteError::SymbolNotFound(symbol.to_string()));
    }
    let timestamp = Utc
        .timestamp_opt(raw.t, 0)
        .single()
        .filter(|_| raw.t > 0)
        .unwrap_or_else(Utc::now);

    Ok(Quote {
        symbol: symbol.to_string(),
        price: raw.c,
        change: raw.d,
        percent_change: raw.dp,
        previous_close: raw.pc.filter(|pc| *pc > 0.0),
        timestamp,
    })
}

fn into_listing(exchange: &str, raw: FinnhubSymbol) -> SymbolListing {
    let symbol = if raw.symbol.is_empty() {
        raw.display_symbol
    } else {
        raw.symbol
    };
    SymbolListing {
        symbol,
        description: raw.description,
        exchange: exchange.to_string(),
    }
}

#[async_trait]
impl QuoteProvider for FinnhubClient {
    fn name(&self) -> &str {
        "finnhub"
    }

    async fn fetch_quote(&self, symbol: &str) -> QuoteResult<Quote> {
        let raw: FinnhubQuote = self.get("/quote", &[("symbol", symbol)]).await?;
        let quote = into_quote(symbol, raw)?;
        debug!("Finnhub quote {}: {:.4}", symbol, quote.price);
        Ok(quote)
    }

    async fn list_symbols(&self, exchange: &str) -> QuoteResult<Vec<SymbolListing>> {
        let raw: Vec<FinnhubSymbol> = self.get("/stock/symbol", &[("exchange", exchange)]).await?;
        if raw.is_empty() {
            warn!("Finnhub returned no symbols for exchange {}", exchange);
        }
        Ok(raw.into_iter().map(|s| into_listing(exchange, s)).collect())
    }
}
