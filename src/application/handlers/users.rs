use super::{ApiError, AppState};
use crate::domain::entities::user::User;
use crate::domain::entities::wallet::Wallet;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub user: User,
    pub wallet: Wallet,
}

/// Create a user with a funded wallet
pub async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let Json(request) = body?;
    let (user, wallet) = state.users.register(&request.username).await?;
    Ok((StatusCode::CREATED, Json(RegisterResponse { user, wallet })))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.users.get(user_id).await?))
}
