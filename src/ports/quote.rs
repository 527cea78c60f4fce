//! Quote Port
//!
//! Point-in-time price estimates for swapping a probe amount of the base
//! asset into a token.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wrapped SOL mint, the base asset for all quotes
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Lamports quoted per price check (0.0001 SOL)
pub const DEFAULT_PROBE_LAMPORTS: u64 = 100_000;

#[derive(Debug, Error)]
pub enum QuoteError {
    /// The provider answered but has no route or no price for this pair
    #[error("No quote available for {0}")]
    NoQuote(String),
    #[error("Quote transport error: {0}")]
    Transport(String),
    #[error("Quote request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Invalid quote response: {0}")]
    InvalidResponse(String),
}

impl QuoteError {
    pub fn is_no_quote(&self) -> bool {
        matches!(self, QuoteError::NoQuote(_))
    }
}

/// A price quote for `in_amount` of the base asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub input_mint: String,
    pub output_mint: String,
    /// Base asset amount in its smallest unit
    pub in_amount: u64,
    /// Token amount in its smallest unit
    pub out_amount: u64,
    /// Base asset per whole token
    pub price: f64,
    pub price_impact_pct: f64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    async fn get_quote(
        &self,
        base_mint: &str,
        token_mint: &str,
        amount: u64,
    ) -> Result<Quote, QuoteError>;
}
