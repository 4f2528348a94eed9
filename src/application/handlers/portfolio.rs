use super::{ApiError, AppState};
use crate::domain::entities::position::Holding;
use crate::domain::services::valuation::PortfolioValuation;
use axum::{
    extract::{Path, State},
    Json,
};

/// Cash and holdings marked to the latest prices
pub async fn valuation(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<PortfolioValuation>, ApiError> {
    Ok(Json(state.portfolio.valuation(user_id).await?))
}

/// Open positions at cost, without pricing
pub async fn holdings(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Holding>>, ApiError> {
    state.users.get(user_id).await?;
    Ok(Json(state.portfolio.holdings(user_id).await?))
}
