//! Store Port
//!
//! Durable storage for tracked tokens, their price history and their
//! profit/loss records.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{PricePoint, ProfitLoss, TokenCreationEvent};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),
    #[error("Failed to decode stored row: {0}")]
    Decode(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Storage used by both the ingestion and the monitoring pipelines.
///
/// Implementations must tolerate a repeated `save_token` for the same mint
/// (retries are at-least-once).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save_token(&self, event: &TokenCreationEvent) -> Result<(), StoreError>;

    async fn save_price_point(&self, point: &PricePoint) -> Result<(), StoreError>;

    /// Insert or replace the record for `record.mint`
    async fn upsert_profit_loss(&self, record: &ProfitLoss) -> Result<(), StoreError>;

    /// Up to `limit` tokens, most recently created first
    async fn get_recent_tokens(&self, limit: usize)
        -> Result<Vec<TokenCreationEvent>, StoreError>;

    /// Full price history for `mint`, newest first
    async fn get_price_history(&self, mint: &str) -> Result<Vec<PricePoint>, StoreError>;

    async fn get_profit_loss(&self, mint: &str) -> Result<Option<ProfitLoss>, StoreError>;

    /// Up to `limit` records ordered by percentage change, best first
    async fn list_profit_loss(&self, limit: usize) -> Result<Vec<ProfitLoss>, StoreError>;
}
