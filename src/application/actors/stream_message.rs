//! Finnhub WebSocket frames
//!
//! Inbound:
//! - `{"type":"trade","data":[{"s":"AAPL","p":190.1,"t":1700000000000,"v":10}]}`
//! - `{"type":"ping"}`
//! - `{"type":"error","msg":"..."}`
//!
//! Outbound: `{"type":"subscribe","symbol":"AAPL"}` and the matching
//! `unsubscribe`.

use crate::domain::entities::quote::PriceTick;
use chrono::{TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum StreamError {
    #[error("Invalid stream URL: {0}")]
    InvalidUrl(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("WebSocket error: {0}")]
    Protocol(String),

    #[error("Malformed frame: {0}")]
    Parse(String),

    #[error("Price stream is not running")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamMessage {
    Trade {
        #[serde(default)]
        data: Vec<TradeData>,
    },
    Ping,
    Error {
        #[serde(default)]
        msg: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TradeData {
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "p")]
    pub price: f64,
    /// Unix milliseconds
    #[serde(rename = "t", default)]
    pub timestamp_ms: i64,
    #[serde(rename = "v", default)]
    pub volume: Option<f64>,
}

#[derive(Serialize)]
struct SubscriptionFrame<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    symbol: &'a str,
}

pub fn parse_frame(text: &str) -> Result<StreamMessage, StreamError> {
    serde_json::from_str(text).map_err(|e| StreamError::Parse(e.to_string()))
}

pub fn subscribe_frame(symbol: &str) -> String {
    subscription_frame("subscribe", symbol)
}

pub fn unsubscribe_frame(symbol: &str) -> String {
    subscription_frame("unsubscribe", symbol)
}

fn subscription_frame(kind: &str, symbol: &str) -> String {
    // Serializing two string fields cannot fail
    serde_json::to_string(&SubscriptionFrame { kind, symbol }).unwrap_or_default()
}

/// Keep only the latest trade of each symbol, dropping unusable prices.
/// Ties on timestamp go to the later entry in the frame.
pub fn latest_ticks(data: Vec<TradeData>) -> Vec<PriceTick> {
    let mut latest: BTreeMap<String, TradeData> = BTreeMap::new();
    for trade in data {
        if trade.symbol.is_empty() || !trade.price.is_finite() || trade.price <= 0.0 {
            continue;
        }
        match latest.get(&trade.symbol) {
            Some(existing) if existing.timestamp_ms > trade.timestamp_ms => {}
            _ => {
                latest.insert(trade.symbol.clone(), trade);
            }
        }
    }

    latest
        .into_values()
        .map(|trade| PriceTick {
            timestamp: Utc
                .timestamp_millis_opt(trade.timestamp_ms)
                .single()
                .filter(|_| trade.timestamp_ms > 0)
                .unwrap_or_else(Utc::now),
            symbol: trade.symbol,
            price: trade.price,
            volume: trade.volume,
            percent_change: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_trade_frame() {
        let frame = r#"{"type":"trade","data":[{"s":"AAPL","p":190.12,"t":1700000000000,"v":5}]}"#;
        match parse_frame(frame).unwrap() {
            StreamMessage::Trade { data } => {
                assert_eq!(data.len(), 1);
                assert_eq!(data[0].symbol, "AAPL");
                assert_eq!(data[0].price, 190.12);
                assert_eq!(data[0].volume, Some(5.0));
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_parse_control_frames() {
        assert_eq!(parse_frame(r#"{"type":"ping"}"#).unwrap(), StreamMessage::Ping);
        assert_eq!(
            parse_frame(r#"{"type":"error","msg":"Invalid token"}"#).unwrap(),
            StreamMessage::Error {
                msg: "Invalid token".to_string()
            }
        );
        assert_eq!(
            parse_frame(r#"{"type":"news","data":[]}"#).unwrap(),
            StreamMessage::Unknown
        );
    }

    #[test]
    fn test_malformed_frame() {
        assert!(matches!(parse_frame("{not json"), Err(StreamError::Parse(_))));
        assert!(matches!(
            parse_frame(r#"{"type":"trade","data":[{"s":"AAPL","p":"abc"}]}"#),
            Err(StreamError::Parse(_))
        ));
    }

    #[test]
    fn test_subscription_frames() {
        assert_eq!(subscribe_frame("AAPL"), r#"{"type":"subscribe","symbol":"AAPL"}"#);
        assert_eq!(
            unsubscribe_frame("BINANCE:BTCUSDT"),
            r#"{"type":"unsubscribe","symbol":"BINANCE:BTCUSDT"}"#
        );
    }

    #[test]
    fn test_latest_tick_per_symbol() {
        let data = vec![
            TradeData { symbol: "AAPL".into(), price: 100.0, timestamp_ms: 2_000, volume: None },
            TradeData { symbol: "MSFT".into(), price: 300.0, timestamp_ms: 1_000, volume: Some(1.0) },
            TradeData { symbol: "AAPL".into(), price: 99.0, timestamp_ms: 1_000, volume: None },
            TradeData { symbol: "AAPL".into(), price: 101.0, timestamp_ms: 2_000, volume: None },
            TradeData { symbol: "BAD".into(), price: 0.0, timestamp_ms: 3_000, volume: None },
        ];

        let ticks = latest_ticks(data);

        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].symbol, "AAPL");
        assert_eq!(ticks[0].price, 101.0);
        assert_eq!(ticks[0].timestamp.timestamp_millis(), 2_000);
        assert_eq!(ticks[1].symbol, "MSFT");
    }
}
