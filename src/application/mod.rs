//! Application Layer - Pipelines and their wiring
//!
//! - `ingestor`: feed payloads to tracked tokens
//! - `price_monitor`: periodic quotes for tracked tokens
//! - `profit_loss`: per-token change since first price
//! - `tracker`: lifecycle of all of the above

pub mod ingestor;
pub mod price_monitor;
pub mod profit_loss;
pub mod tracker;

pub use ingestor::{EventIngestor, IngestError, IngestOutcome};
pub use price_monitor::{PriceCheckError, PriceMonitor, PriceMonitorConfig, TickReport};
pub use profit_loss::{ProfitLossCalculator, RecomputeOutcome};
pub use tracker::{Tracker, TrackerError, TrackerStatus};
