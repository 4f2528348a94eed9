use super::{ApiError, AppState};
use crate::domain::entities::wallet::{Wallet, WalletMovement};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MovementResponse {
    pub wallet: Wallet,
    pub movement: WalletMovement,
}

#[derive(Debug, Deserialize)]
pub struct MovementQuery {
    /// Results to return (default 50, max 1000)
    pub limit: Option<i64>,
}

pub async fn get_wallet(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Wallet>, ApiError> {
    Ok(Json(state.wallets.get(user_id).await?))
}

pub async fn deposit(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<MovementResponse>, ApiError> {
    let Json(request) = body?;
    let (wallet, movement) = state.wallets.deposit(user_id, request.amount).await?;
    Ok(Json(MovementResponse { wallet, movement }))
}

pub async fn withdraw(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    body: Result<Json<AmountRequest>, JsonRejection>,
) -> Result<Json<MovementResponse>, ApiError> {
    let Json(request) = body?;
    let (wallet, movement) = state.wallets.withdraw(user_id, request.amount).await?;
    Ok(Json(MovementResponse { wallet, movement }))
}

pub async fn movements(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    query: Result<Query<MovementQuery>, QueryRejection>,
) -> Result<Json<Vec<WalletMovement>>, ApiError> {
    let Query(params) = query?;
    Ok(Json(state.wallets.movements(user_id, params.limit).await?))
}
