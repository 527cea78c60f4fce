//! Profit/Loss Calculator
//!
//! Recomputes a token's profit/loss record from its full price history.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::domain::{short_mint, ProfitLoss};
use crate::ports::{StoreError, TokenStore};

#[derive(Debug, Clone, PartialEq)]
pub enum RecomputeOutcome {
    /// Fewer than two price points; nothing written
    NotEnoughData,
    Updated(ProfitLoss),
}

#[derive(Clone)]
pub struct ProfitLossCalculator {
    store: Arc<dyn TokenStore>,
}

impl ProfitLossCalculator {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Compare the earliest and latest recorded prices and store the result.
    pub async fn recompute(&self, mint: &str) -> Result<RecomputeOutcome, StoreError> {
        let history = self.store.get_price_history(mint).await?;

        let Some(record) = ProfitLoss::from_history(mint, &history, Utc::now()) else {
            debug!(mint = short_mint(mint), points = history.len(), "Not enough price history");
            return Ok(RecomputeOutcome::NotEnoughData);
        };

        self.store.upsert_profit_loss(&record).await?;

        debug!(
            mint = short_mint(mint),
            initial = record.initial_price,
            current = record.current_price,
            pct = record.profit_loss_pct,
            profitable = record.is_profitable(),
            "Profit/loss updated"
        );
        Ok(RecomputeOutcome::Updated(record))
    }
}
