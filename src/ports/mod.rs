//! Ports Layer - Trait definitions for external dependencies
//!
//! Following hexagonal architecture, these traits abstract:
//! - Durable storage of tokens, prices and profit/loss records
//! - Price quotes from a DEX aggregator
//! - Delivery of raw feed payloads

pub mod feed;
pub mod mocks;
pub mod quote;
pub mod store;

pub use feed::PayloadHandler;
pub use quote::{Quote, QuoteError, QuoteProvider, DEFAULT_PROBE_LAMPORTS, SOL_MINT};
pub use store::{StoreError, TokenStore};
