//! Qualification Filter
//!
//! Decides whether a newly observed token is worth tracking.

use std::fmt;

use super::token::{TokenCreationEvent, TokenMetrics};

/// Tokens whose curve holds less than this share of market cap are ignored.
pub const MIN_LIQUIDITY_RATIO: f64 = 0.10;

/// Why a token was not tracked
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    MarketCapBelowMinimum { market_cap_sol: f64, minimum: f64 },
    LiquidityBelowMinimum { liquidity_sol: f64, minimum: f64 },
    LiquidityRatioTooLow { ratio: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MarketCapBelowMinimum { market_cap_sol, minimum } => {
                write!(f, "market cap {:.2} SOL < {:.2} SOL", market_cap_sol, minimum)
            }
            Rejection::LiquidityBelowMinimum { liquidity_sol, minimum } => {
                write!(f, "liquidity {:.2} SOL < {:.2} SOL", liquidity_sol, minimum)
            }
            Rejection::LiquidityRatioTooLow { ratio } => {
                write!(f, "liquidity ratio {:.3} < {:.2}", ratio, MIN_LIQUIDITY_RATIO)
            }
        }
    }
}

/// Threshold filter applied on first sight of a token
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualificationFilter {
    pub min_market_cap_sol: f64,
    pub min_liquidity_sol: f64,
}

impl QualificationFilter {
    pub fn new(min_market_cap_sol: f64, min_liquidity_sol: f64) -> Self {
        Self {
            min_market_cap_sol,
            min_liquidity_sol,
        }
    }

    /// Check thresholds in order: market cap, liquidity, liquidity ratio.
    pub fn check(
        &self,
        event: &TokenCreationEvent,
        metrics: &TokenMetrics,
    ) -> Result<(), Rejection> {
        if event.market_cap_sol < self.min_market_cap_sol {
            return Err(Rejection::MarketCapBelowMinimum {
                market_cap_sol: event.market_cap_sol,
                minimum: self.min_market_cap_sol,
            });
        }

        if event.v_sol_in_bonding_curve < self.min_liquidity_sol {
            return Err(Rejection::LiquidityBelowMinimum {
                liquidity_sol: event.v_sol_in_bonding_curve,
                minimum: self.min_liquidity_sol,
            });
        }

        if metrics.liquidity_ratio < MIN_LIQUIDITY_RATIO {
            return Err(Rejection::LiquidityRatioTooLow {
                ratio: metrics.liquidity_ratio,
            });
        }

        Ok(())
    }
}
