//! Token Domain Types
//!
//! Token creation events as observed on the feed, the bonding-curve
//! metrics derived from them, and the price points recorded over time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A newly created token as reported by the launch feed.
///
/// Written once to the store when the token qualifies; never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenCreationEvent {
    /// Token mint address (unique identity)
    pub mint: String,
    pub name: String,
    pub symbol: String,
    /// Bonding curve account for this token
    pub bonding_curve_key: String,
    /// Virtual SOL held by the bonding curve at creation
    pub v_sol_in_bonding_curve: f64,
    /// Virtual tokens held by the bonding curve at creation
    pub v_tokens_in_bonding_curve: f64,
    /// Creator's initial buy
    pub initial_buy: f64,
    /// Market cap in SOL at creation
    pub market_cap_sol: f64,
    /// SOL spent by the creation transaction
    pub sol_amount: f64,
    /// Signature of the creation transaction
    pub signature: String,
    pub trader_public_key: String,
    pub tx_type: String,
    /// Metadata URI (usually IPFS)
    pub uri: String,
    /// When this process first observed the token
    pub created_at: DateTime<Utc>,
}

impl TokenCreationEvent {
    /// Derive bonding-curve metrics, stamping them with `observed_at`.
    pub fn metrics(&self, observed_at: DateTime<Utc>) -> TokenMetrics {
        TokenMetrics::from_curve(
            self.v_sol_in_bonding_curve,
            self.v_tokens_in_bonding_curve,
            self.market_cap_sol,
            observed_at,
        )
    }

    /// Short form of the mint for log lines
    pub fn short_mint(&self) -> &str {
        short_mint(&self.mint)
    }
}

/// Metrics derived from the bonding-curve state of a creation event.
///
/// Only used for the qualification decision; never persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenMetrics {
    /// SOL per token implied by the curve
    pub token_price: f64,
    /// SOL in curve relative to market cap
    pub liquidity_ratio: f64,
    /// SOL in curve times tokens in curve
    pub market_depth: f64,
    pub first_seen: DateTime<Utc>,
}

impl TokenMetrics {
    pub fn from_curve(
        v_sol: f64,
        v_tokens: f64,
        market_cap_sol: f64,
        first_seen: DateTime<Utc>,
    ) -> Self {
        let token_price = if v_tokens == 0.0 { 0.0 } else { v_sol / v_tokens };
        let liquidity_ratio = if market_cap_sol == 0.0 {
            0.0
        } else {
            v_sol / market_cap_sol
        };

        Self {
            token_price,
            liquidity_ratio,
            market_depth: v_sol * v_tokens,
            first_seen,
        }
    }
}

/// A single observed price for a token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub mint: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}

impl PricePoint {
    pub fn new(mint: impl Into<String>, price: f64, timestamp: DateTime<Utc>) -> Self {
        Self {
            mint: mint.into(),
            price,
            timestamp,
        }
    }
}

/// First eight characters of a mint, or the whole thing if shorter.
pub fn short_mint(mint: &str) -> &str {
    mint.get(..8).unwrap_or(mint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_metrics_from_curve() {
        let metrics = TokenMetrics::from_curve(30.0, 1_000_000.0, 60.0, Utc::now());

        assert_relative_eq!(metrics.token_price, 0.00003, epsilon = 1e-12);
        assert_relative_eq!(metrics.liquidity_ratio, 0.5, epsilon = 1e-12);
        assert_relative_eq!(metrics.market_depth, 30_000_000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_tokens_in_curve_gives_zero_price() {
        let metrics = TokenMetrics::from_curve(30.0, 0.0, 60.0, Utc::now());
        assert_eq!(metrics.token_price, 0.0);
        assert!(metrics.token_price.is_finite());
    }

    #[test]
    fn test_zero_market_cap_gives_zero_ratio() {
        let metrics = TokenMetrics::from_curve(30.0, 1_000.0, 0.0, Utc::now());
        assert_eq!(metrics.liquidity_ratio, 0.0);
    }

    #[test]
    fn test_short_mint() {
        assert_eq!(short_mint("ABCDEFGHIJKLMNOP"), "ABCDEFGH");
        assert_eq!(short_mint("abc"), "abc");
    }
}
