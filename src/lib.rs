//! Stock Trading Simulator Library
//!
//! Paper trading against live or simulated quotes: user wallets, market
//! orders settled at the current price, holdings valued at market, and
//! price ticks streamed to subscribers.

pub mod application;
pub mod auth;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod persistence;
pub mod rate_limit;
pub mod task_runner;
