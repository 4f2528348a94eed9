use super::{ApiError, AppState};
use crate::application::services::trading_service::{OrderReceipt, OrderRequest};
use crate::domain::entities::order::TradeSide;
use crate::domain::entities::transaction::{HistoryFilter, TradeTransaction};
use crate::domain::errors::TradingError;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Deserialize;

/// Order body; `side` is parsed case-insensitively
#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub symbol: String,
    pub side: String,
    pub quantity: f64,
}

/// Query parameters for the transaction history
#[derive(Debug, Default, Deserialize)]
pub struct TransactionQuery {
    pub symbol: Option<String>,
    /// BUY or SELL
    pub side: Option<String>,
    /// Results to return (default 100, max 1000)
    pub limit: Option<i64>,
}

impl TryFrom<TransactionQuery> for HistoryFilter {
    type Error = TradingError;

    fn try_from(query: TransactionQuery) -> Result<Self, Self::Error> {
        let side = query
            .side
            .filter(|s| !s.trim().is_empty())
            .map(|s| s.parse::<TradeSide>())
            .transpose()?;
        Ok(HistoryFilter {
            symbol: query.symbol.filter(|s| !s.trim().is_empty()),
            side,
            limit: query.limit,
        })
    }
}

/// Execute a market order at the current price
pub async fn place_order(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    body: Result<Json<PlaceOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderReceipt>), ApiError> {
    let Json(request) = body?;
    let side = request.side.parse::<TradeSide>().map_err(TradingError::from)?;

    let receipt = state
        .trading
        .place_order(
            user_id,
            OrderRequest {
                symbol: request.symbol,
                side,
                quantity: request.quantity,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Trade history, newest first
pub async fn transactions(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> Result<Json<Vec<TradeTransaction>>, ApiError> {
    let Query(params) = query?;
    let filter = HistoryFilter::try_from(params)?;
    Ok(Json(state.trading.history(user_id, filter).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_to_filter() {
        let filter = HistoryFilter::try_from(TransactionQuery {
            symbol: Some("AAPL".into()),
            side: Some("sell".into()),
            limit: Some(5),
        })
        .unwrap();
        assert_eq!(filter.symbol.as_deref(), Some("AAPL"));
        assert_eq!(filter.side, Some(TradeSide::Sell));
        assert_eq!(filter.limit, Some(5));

        let empty = HistoryFilter::try_from(TransactionQuery {
            symbol: Some(" ".into()),
            side: Some("".into()),
            limit: None,
        })
        .unwrap();
        assert!(empty.symbol.is_none());
        assert!(empty.side.is_none());
    }

    #[test]
    fn test_bad_side_is_invalid_input() {
        let err = HistoryFilter::try_from(TransactionQuery {
            side: Some("hold".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, TradingError::InvalidInput(_)));
    }
}
