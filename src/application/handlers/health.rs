use super::AppState;
use crate::application::actors::ConnectionState;
use axum::{extract::State, Json};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub quote_source: String,
    /// Upstream stream state, absent when quotes are polled
    pub stream: Option<ConnectionState>,
    pub cached_prices: usize,
    pub price_listeners: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let stream = state.stream.as_ref().map(|handle| handle.state());
    let status = match stream {
        Some(ConnectionState::Failed) => "degraded",
        _ => "ok",
    };

    let registry = state.prices.registry();
    let price_listeners = registry
        .symbols()
        .iter()
        .map(|symbol| registry.listener_count(symbol))
        .sum();

    Json(HealthResponse {
        status,
        quote_source: state.prices.provider_name().to_string(),
        stream,
        cached_prices: state.prices.cache().len(),
        price_listeners,
    })
}
