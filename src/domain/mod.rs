//! Domain Layer - Core types for the token tracker
//!
//! Pure types and calculations with no I/O. All external interactions
//! happen through the ports layer.
//!
//! - `token`: creation events, bonding-curve metrics, price points
//! - `qualification`: first-sight filter for new tokens
//! - `profit_loss`: change between first and latest observed price
//! - `metrics`: operation timings and pipeline counters

pub mod metrics;
pub mod profit_loss;
pub mod qualification;
pub mod token;

pub use metrics::{CountersSnapshot, Operation, OperationMetrics, PipelineCounters};
pub use profit_loss::ProfitLoss;
pub use qualification::{QualificationFilter, Rejection, MIN_LIQUIDITY_RATIO};
pub use token::{short_mint, PricePoint, TokenCreationEvent, TokenMetrics};
