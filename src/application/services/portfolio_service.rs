use crate::application::services::price_service::PriceService;
use crate::domain::entities::position::Holding;
use crate::domain::errors::TradingError;
use crate::domain::services::valuation::{value_portfolio, PortfolioValuation};
use crate::persistence::repository::{HoldingRepository, WalletRepository};
use std::sync::Arc;
use tracing::debug;

pub struct PortfolioService {
    holdings: HoldingRepository,
    wallets: WalletRepository,
    prices: Arc<PriceService>,
}

impl PortfolioService {
    pub fn new(holdings: HoldingRepository, wallets: WalletRepository, prices: Arc<PriceService>) -> Self {
        Self {
            holdings,
            wallets,
            prices,
        }
    }

    pub async fn holdings(&self, user_id: i64) -> Result<Vec<Holding>, TradingError> {
        Ok(self
            .holdings
            .list_by_user(user_id)
            .await?
            .into_iter()
            .map(Holding::from)
            .collect())
    }

    /// Cash plus every holding marked to its latest price. Holdings without
    /// a price are carried at cost and flagged as unpriced.
    pub async fn valuation(&self, user_id: i64) -> Result<PortfolioValuation, TradingError> {
        let wallet = self
            .wallets
            .get(user_id)
            .await?
            .ok_or(TradingError::UserNotFound(user_id))?;
        let holdings = self.holdings(user_id).await?;

        let symbols: Vec<String> = holdings.iter().map(|h| h.symbol.clone()).collect();
        let marks = self.prices.mark_prices(&symbols).await;
        if marks.len() < symbols.len() {
            debug!(
                "Valuing user {} with {} unpriced holding(s)",
                user_id,
                symbols.len() - marks.len()
            );
        }

        Ok(value_portfolio(wallet.cash_balance, &holdings, &marks))
    }
}
