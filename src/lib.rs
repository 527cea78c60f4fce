//! pump-tracker - Pump.fun launch tracker library
//!
//! Streams newly created pump.fun tokens, keeps the ones that pass a
//! liquidity filter, polls Jupiter for their price and records
//! profit/loss since launch.
//!
//! # Modules
//!
//! - `domain`: Core types (TokenCreationEvent, PricePoint, ProfitLoss, metrics)
//! - `ports`: Trait abstractions (TokenStore, QuoteProvider, PayloadHandler)
//! - `adapters`: External implementations (PumpPortal feed, Jupiter, SQLite, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Ingestion and price-monitoring pipelines

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
