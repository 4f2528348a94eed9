//! Upstream price stream actor
//!
//! Owns the Finnhub WebSocket connection. Ticks go into the price cache and
//! are then fanned out to listeners. Symbol subscriptions change at runtime
//! through a command channel and are replayed on every reconnect. Lost
//! connections are retried with exponential backoff.

use super::stream_message::{
    latest_ticks, parse_frame, subscribe_frame, unsubscribe_frame, StreamError, StreamMessage,
};
use crate::config::SimulatorConfig;
use crate::domain::services::listener_registry::ListenerRegistry;
use crate::domain::services::price_cache::PriceCache;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};
use url::Url;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

#[derive(Debug, Clone)]
pub enum StreamCommand {
    Subscribe(String),
    Unsubscribe(String),
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
    /// 0 = retry forever
    pub max_retries: u32,
    pub connect_timeout: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: "wss://ws.finnhub.io".to_string(),
            api_key: None,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            max_retries: 0,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl StreamConfig {
    pub fn from_simulator_config(config: &SimulatorConfig) -> Self {
        Self {
            url: config.finnhub_ws_url.clone(),
            api_key: config.finnhub_api_key.clone(),
            base_backoff: Duration::from_millis(config.stream_base_backoff_ms),
            max_backoff: Duration::from_millis(config.stream_max_backoff_ms),
            backoff_multiplier: config.stream_backoff_multiplier,
            max_retries: config.stream_max_retries,
            connect_timeout: config.http_timeout(),
        }
    }
}

/// Delay before reconnect attempt `attempt` (1-based):
/// base × multiplier^(attempt−1), capped at the max backoff
pub fn backoff_delay(config: &StreamConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let millis = config.base_backoff.as_millis() as f64 * config.backoff_multiplier.powi(exponent);
    let max = config.max_backoff.as_millis() as f64;
    if !millis.is_finite() || millis >= max {
        config.max_backoff
    } else {
        Duration::from_millis(millis as u64)
    }
}

/// Stream URL with the API token appended
pub fn connection_url(config: &StreamConfig) -> Result<Url, StreamError> {
    let mut url = Url::parse(&config.url).map_err(|e| StreamError::InvalidUrl(e.to_string()))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(StreamError::InvalidUrl(format!(
            "unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if let Some(key) = config.api_key.as_deref().filter(|k| !k.is_empty()) {
        url.query_pairs_mut().append_pair("token", key);
    }
    Ok(url)
}

/// Cloneable control surface of a running stream
#[derive(Clone)]
pub struct PriceStreamHandle {
    commands: mpsc::Sender<StreamCommand>,
    state: watch::Receiver<ConnectionState>,
}

impl PriceStreamHandle {
    pub async fn subscribe(&self, symbol: &str) -> Result<(), StreamError> {
        self.commands
            .send(StreamCommand::Subscribe(symbol.to_string()))
            .await
            .map_err(|_| StreamError::Closed)
    }

    pub async fn unsubscribe(&self, symbol: &str) -> Result<(), StreamError> {
        self.commands
            .send(StreamCommand::Unsubscribe(symbol.to_string()))
            .await
            .map_err(|_| StreamError::Closed)
    }

    pub async fn shutdown(&self) {
        if self.commands.send(StreamCommand::Shutdown).await.is_err() {
            debug!("Price stream already stopped");
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Wait until the stream reaches `target`. Returns false on timeout or
    /// when the actor is gone.
    pub async fn wait_for_state(&self, target: ConnectionState, timeout: Duration) -> bool {
        let mut state = self.state.clone();
        let reached = matches!(
            tokio::time::timeout(timeout, state.wait_for(|s| *s == target)).await,
            Ok(Ok(_))
        );
        reached
    }
}

enum SessionEnd {
    Shutdown,
    Lost { was_connected: bool, reason: String },
}

pub struct PriceStreamActor {
    config: StreamConfig,
    cache: Arc<PriceCache>,
    registry: Arc<ListenerRegistry>,
    subscriptions: BTreeSet<String>,
    commands: mpsc::Receiver<StreamCommand>,
    state: watch::Sender<ConnectionState>,
}

impl PriceStreamActor {
    pub fn spawn(
        config: StreamConfig,
        cache: Arc<PriceCache>,
        registry: Arc<ListenerRegistry>,
        symbols: impl IntoIterator<Item = String>,
    ) -> (PriceStreamHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(100);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let actor = Self {
            config,
            cache,
            registry,
            subscriptions: symbols.into_iter().collect(),
            commands: command_rx,
            state: state_tx,
        };

        let task = tokio::spawn(actor.run());
        (
            PriceStreamHandle {
                commands: command_tx,
                state: state_rx,
            },
            task,
        )
    }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Price stream state: {:?} -> {:?}", previous, next);
        }
    }

    async fn run(mut self) {
        let url = match connection_url(&self.config) {
            Ok(url) => url,
            Err(e) => {
                error!("Price stream cannot start: {}", e);
                self.set_state(ConnectionState::Failed);
                return;
            }
        };

        info!(
            "Price stream starting with {} symbol(s)",
            self.subscriptions.len()
        );
        let mut attempt: u32 = 0;

        loop {
            self.set_state(if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            });

            match self.run_session(&url).await {
                SessionEnd::Shutdown => break,
                SessionEnd::Lost {
                    was_connected,
                    reason,
                } => {
                    if was_connected {
                        attempt = 0;
                    }
                    attempt += 1;

                    if self.config.max_retries > 0 && attempt > self.config.max_retries {
                        error!(
                            "Price stream giving up after {} attempt(s): {}",
                            self.config.max_retries, reason
                        );
                        self.set_state(ConnectionState::Failed);
                        return;
                    }

                    let delay = backoff_delay(&self.config, attempt);
                    warn!(
                        "Price stream lost ({}), reconnect attempt {} in {:?}",
                        reason, attempt, delay
                    );
                    self.set_state(ConnectionState::Reconnecting);

                    if !self.wait_before_retry(delay).await {
                        break;
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Price stream stopped");
    }

    /// Sleep out the backoff while still accepting commands.
    /// Returns false when shutdown was requested.
    async fn wait_before_retry(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                command = self.commands.recv() => match command {
                    None | Some(StreamCommand::Shutdown) => return false,
                    Some(StreamCommand::Subscribe(symbol)) => {
                        self.subscriptions.insert(symbol);
                    }
                    Some(StreamCommand::Unsubscribe(symbol)) => {
                        self.subscriptions.remove(&symbol);
                    }
                }
            }
        }
    }

    async fn run_session(&mut self, url: &Url) -> SessionEnd {
        let connect = tokio::time::timeout(self.config.connect_timeout, connect_async(url.as_str()));
        let stream = match connect.await {
            Ok(Ok((stream, _))) => stream,
            Ok(Err(e)) => {
                return SessionEnd::Lost {
                    was_connected: false,
                    reason: StreamError::Connect(e.to_string()).to_string(),
                }
            }
            Err(_) => {
                return SessionEnd::Lost {
                    was_connected: false,
                    reason: StreamError::Timeout(self.config.connect_timeout).to_string(),
                }
            }
        };

        self.set_state(ConnectionState::Connected);
        info!("Price stream connected to {}", self.config.url);

        let (mut write, mut read) = stream.split();

        for symbol in &self.subscriptions {
            if let Err(e) = write.send(Message::Text(subscribe_frame(symbol))).await {
                return SessionEnd::Lost {
                    was_connected: true,
                    reason: StreamError::Protocol(e.to_string()).to_string(),
                };
            }
            debug!("Subscribed upstream: {}", symbol);
        }

        loop {
            tokio::select! {
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = write.send(Message::Pong(payload)).await {
                            return SessionEnd::Lost {
                                was_connected: true,
                                reason: StreamError::Protocol(e.to_string()).to_string(),
                            };
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return SessionEnd::Lost {
                            was_connected: true,
                            reason: format!("closed by server: {:?}", frame),
                        };
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        return SessionEnd::Lost {
                            was_connected: true,
                            reason: StreamError::Protocol(e.to_string()).to_string(),
                        };
                    }
                    None => {
                        return SessionEnd::Lost {
                            was_connected: true,
                            reason: "stream ended".to_string(),
                        };
                    }
                },
                command = self.commands.recv() => {
                    let frame = match command {
                        None | Some(StreamCommand::Shutdown) => {
                            let _ = write.send(Message::Close(None)).await;
                            return SessionEnd::Shutdown;
                        }
                        Some(StreamCommand::Subscribe(symbol)) => {
                            if !self.subscriptions.insert(symbol.clone()) {
                                continue;
                            }
                            info!("Subscribing upstream: {}", symbol);
                            subscribe_frame(&symbol)
                        }
                        Some(StreamCommand::Unsubscribe(symbol)) => {
                            if !self.subscriptions.remove(&symbol) {
                                continue;
                            }
                            info!("Unsubscribing upstream: {}", symbol);
                            unsubscribe_frame(&symbol)
                        }
                    };
                    if let Err(e) = write.send(Message::Text(frame)).await {
                        return SessionEnd::Lost {
                            was_connected: true,
                            reason: StreamError::Protocol(e.to_string()).to_string(),
                        };
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match parse_frame(text) {
            Ok(StreamMessage::Trade { data }) => {
                for tick in latest_ticks(data) {
                    let enriched = self.cache.apply_tick(&tick);
                    let report = self.registry.dispatch(&enriched);
                    if report.dropped > 0 {
                        debug!(
                            "{}: {} slow listener(s) skipped a tick",
                            enriched.symbol, report.dropped
                        );
                    }
                }
            }
            Ok(StreamMessage::Ping) => debug!("Upstream ping"),
            Ok(StreamMessage::Error { msg }) => warn!("Upstream error frame: {}", msg),
            Ok(StreamMessage::Unknown) => debug!("Ignoring unknown frame type"),
            Err(e) => warn!("Ignoring frame: {}", e),
        }
    }
}
