//! Quote Provider Factory
//!
//! Builds the single quote provider shared by the price service, the symbol
//! importer and the refresh task.

use crate::config::{QuoteSource, SimulatorConfig};
use crate::domain::repositories::quote_provider::{QuoteError, QuoteProvider};
use crate::infrastructure::finnhub_client::{FinnhubClient, FinnhubConfig};
use crate::infrastructure::simulated_quotes::SimulatedQuoteProvider;
use std::sync::Arc;
use tracing::{error, info};

pub struct QuoteProviderFactory;

impl QuoteProviderFactory {
    /// Create the provider selected by `config.quote_source`
    pub fn create(config: &SimulatorConfig) -> Result<Arc<dyn QuoteProvider>, QuoteError> {
        match config.quote_source {
            QuoteSource::Finnhub => {
                let finnhub_config = FinnhubConfig::from_simulator_config(config)?;
                match FinnhubClient::new(finnhub_config) {
                    Ok(client) => {
                        info!("✓ Finnhub quote provider created");
                        Ok(Arc::new(client) as Arc<dyn QuoteProvider>)
                    }
                    Err(e) => {
                        error!("✗ Failed to create Finnhub client: {}", e);
                        Err(e)
                    }
                }
            }
            QuoteSource::Simulated => {
                info!(
                    "✓ Simulated quote provider created (volatility {:.2}%)",
                    config.simulated_volatility * 100.0
                );
                Ok(Arc::new(SimulatedQuoteProvider::new(config.simulated_volatility)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_by_default() {
        let provider = QuoteProviderFactory::create(&SimulatorConfig::default()).unwrap();
        assert_eq!(provider.name(), "simulated");
    }

    #[test]
    fn test_finnhub_requires_key() {
        let config = SimulatorConfig {
            quote_source: QuoteSource::Finnhub,
            finnhub_api_key: None,
            ..SimulatorConfig::default()
        };
        assert!(matches!(
            QuoteProviderFactory::create(&config),
            Err(QuoteError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_finnhub_with_key() {
        let config = SimulatorConfig {
            quote_source: QuoteSource::Finnhub,
            finnhub_api_key: Some("abc".to_string()),
            ..SimulatorConfig::default()
        };
        let provider = QuoteProviderFactory::create(&config).unwrap();
        assert_eq!(provider.name(), "finnhub");
    }
}
