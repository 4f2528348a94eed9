use super::{ApiError, AppState};
use crate::application::services::symbol_service::ImportSummary;
use crate::domain::entities::symbol::TradableSymbol;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct SymbolQuery {
    /// Only enabled symbols when true
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    /// Exchange code, e.g. "US"
    pub exchange: String,
}

#[derive(Debug, Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

pub async fn list_symbols(
    State(state): State<AppState>,
    query: Result<Query<SymbolQuery>, QueryRejection>,
) -> Result<Json<Vec<TradableSymbol>>, ApiError> {
    let Query(params) = query?;
    Ok(Json(state.symbols.list(params.enabled).await?))
}

pub async fn get_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<TradableSymbol>, ApiError> {
    Ok(Json(state.symbols.get(&symbol).await?))
}

/// Pull an exchange listing from the quote provider. New symbols start disabled.
pub async fn import_symbols(
    State(state): State<AppState>,
    body: Result<Json<ImportRequest>, JsonRejection>,
) -> Result<Json<ImportSummary>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.symbols.import(&request.exchange).await?))
}

pub async fn set_enabled(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    body: Result<Json<EnabledRequest>, JsonRejection>,
) -> Result<Json<TradableSymbol>, ApiError> {
    let Json(request) = body?;
    Ok(Json(state.symbols.set_enabled(&symbol, request.enabled).await?))
}
