use super::{ApiError, AppState};
use crate::domain::entities::quote::PriceTick;
use crate::domain::services::price_cache::CachedPrice;
use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

/// Interval of SSE keep-alive comments
const KEEP_ALIVE_SECS: u64 = 15;

/// Latest price of a known symbol
pub async fn get_price(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<CachedPrice>, ApiError> {
    let symbol = state.symbols.get(&symbol).await?.symbol;
    Ok(Json(state.prices.current_price(&symbol).await?))
}

fn tick_event(tick: &PriceTick) -> Option<Event> {
    match serde_json::to_string(tick) {
        Ok(data) => Some(Event::default().event("tick").data(data)),
        Err(e) => {
            tracing::warn!("Dropping unserializable tick for {}: {}", tick.symbol, e);
            None
        }
    }
}

/// Server-sent ticks of one tradable symbol
///
/// The last cached price goes out first so clients start with a value.
/// The listener unsubscribes when the client disconnects.
pub async fn stream_prices(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let symbol = state.symbols.require_tradable(&symbol).await?.symbol;
    let receiver = state.prices.subscribe(&symbol);
    tracing::debug!("SSE client subscribed to {}", symbol);

    let initial: Vec<Result<Event, Infallible>> = state
        .prices
        .cache()
        .get(&symbol)
        .map(|cached| PriceTick {
            symbol: cached.symbol,
            price: cached.price,
            volume: None,
            percent_change: cached.percent_change,
            timestamp: cached.updated_at,
        })
        .and_then(|tick| tick_event(&tick))
        .map(Ok)
        .into_iter()
        .collect();

    let ticks = ReceiverStream::new(receiver).filter_map(|tick| tick_event(&tick).map(Ok));
    let stream = tokio_stream::iter(initial).chain(ticks);

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(KEEP_ALIVE_SECS))
            .text("keepalive"),
    ))
}
