//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Pump.fun: launch feed WebSocket connection
//! - Jupiter: DEX aggregator quote client
//! - SQLite: token, price and profit/loss storage
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod jupiter;
pub mod pump_fun;
pub mod sqlite;

pub use cli::CliApp;
pub use jupiter::JupiterClient;
pub use pump_fun::ConnectionManager;
pub use sqlite::SqliteStore;
