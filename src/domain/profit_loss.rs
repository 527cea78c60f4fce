//! Profit/Loss
//!
//! Per-token performance from the first recorded price to the latest one.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::token::PricePoint;

/// Live profit/loss record for a token (one per mint, overwritten on update)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitLoss {
    pub mint: String,
    pub initial_price: f64,
    pub current_price: f64,
    /// current_price - initial_price
    pub profit_loss: f64,
    /// Change relative to initial_price, in percent
    pub profit_loss_pct: f64,
    pub last_updated: DateTime<Utc>,
}

impl ProfitLoss {
    /// Flat record used when a token starts being tracked.
    pub fn opening(mint: impl Into<String>, price: f64, at: DateTime<Utc>) -> Self {
        Self::between(mint, price, price, at)
    }

    pub fn between(
        mint: impl Into<String>,
        initial_price: f64,
        current_price: f64,
        at: DateTime<Utc>,
    ) -> Self {
        let profit_loss = current_price - initial_price;
        let profit_loss_pct = if initial_price == 0.0 {
            0.0
        } else {
            profit_loss / initial_price * 100.0
        };

        Self {
            mint: mint.into(),
            initial_price,
            current_price,
            profit_loss,
            profit_loss_pct,
            last_updated: at,
        }
    }

    /// Build from a newest-first price history.
    ///
    /// Returns `None` with fewer than two points.
    pub fn from_history(
        mint: impl Into<String>,
        newest_first: &[PricePoint],
        at: DateTime<Utc>,
    ) -> Option<Self> {
        if newest_first.len() < 2 {
            return None;
        }
        let current = newest_first.first()?;
        let initial = newest_first.last()?;
        Some(Self::between(mint, initial.price, current.price, at))
    }

    pub fn is_profitable(&self) -> bool {
        self.profit_loss > 0.0
    }
}
