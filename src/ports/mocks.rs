//! In-memory port implementations for tests and dry runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::feed::PayloadHandler;
use super::quote::{Quote, QuoteError, QuoteProvider};
use super::store::{StoreError, TokenStore};
use crate::domain::{PricePoint, ProfitLoss, TokenCreationEvent};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct StoreState {
    tokens: Vec<TokenCreationEvent>,
    prices: Vec<PricePoint>,
    profit_loss: HashMap<String, ProfitLoss>,
    save_token_calls: usize,
    fail_price_points: bool,
    fail_tokens: bool,
}

/// Store backed by vectors and maps, with switchable write failures
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to make every `save_price_point` fail
    pub fn failing_price_points(self) -> Self {
        lock(&self.state).fail_price_points = true;
        self
    }

    /// Builder method to make every `save_token` fail
    pub fn failing_tokens(self) -> Self {
        lock(&self.state).fail_tokens = true;
        self
    }

    pub fn tokens(&self) -> Vec<TokenCreationEvent> {
        lock(&self.state).tokens.clone()
    }

    pub fn price_points(&self) -> Vec<PricePoint> {
        lock(&self.state).prices.clone()
    }

    pub fn profit_loss_for(&self, mint: &str) -> Option<ProfitLoss> {
        lock(&self.state).profit_loss.get(mint).cloned()
    }

    /// Number of `save_token` calls, including ignored duplicates
    pub fn save_token_calls(&self) -> usize {
        lock(&self.state).save_token_calls
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn save_token(&self, event: &TokenCreationEvent) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        state.save_token_calls += 1;
        if state.fail_tokens {
            return Err(StoreError::Database("token insert rejected".into()));
        }
        if !state.tokens.iter().any(|t| t.mint == event.mint) {
            state.tokens.push(event.clone());
        }
        Ok(())
    }

    async fn save_price_point(&self, point: &PricePoint) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state.fail_price_points {
            return Err(StoreError::Database("price insert rejected".into()));
        }
        state.prices.push(point.clone());
        Ok(())
    }

    async fn upsert_profit_loss(&self, record: &ProfitLoss) -> Result<(), StoreError> {
        lock(&self.state)
            .profit_loss
            .insert(record.mint.clone(), record.clone());
        Ok(())
    }

    async fn get_recent_tokens(
        &self,
        limit: usize,
    ) -> Result<Vec<TokenCreationEvent>, StoreError> {
        let mut tokens: Vec<_> = lock(&self.state).tokens.iter().rev().cloned().collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tokens.truncate(limit);
        Ok(tokens)
    }

    async fn get_price_history(&self, mint: &str) -> Result<Vec<PricePoint>, StoreError> {
        let mut points: Vec<_> = lock(&self.state)
            .prices
            .iter()
            .rev()
            .filter(|p| p.mint == mint)
            .cloned()
            .collect();
        points.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(points)
    }

    async fn get_profit_loss(&self, mint: &str) -> Result<Option<ProfitLoss>, StoreError> {
        Ok(self.profit_loss_for(mint))
    }

    async fn list_profit_loss(&self, limit: usize) -> Result<Vec<ProfitLoss>, StoreError> {
        let mut records: Vec<_> = lock(&self.state).profit_loss.values().cloned().collect();
        records.sort_by(|a, b| b.profit_loss_pct.total_cmp(&a.profit_loss_pct));
        records.truncate(limit);
        Ok(records)
    }
}

/// Quote provider answering from a fixed price table
#[derive(Debug, Default, Clone)]
pub struct StaticQuoteProvider {
    prices: Arc<Mutex<HashMap<String, f64>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StaticQuoteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the price returned for a mint
    pub fn with_price(self, mint: &str, price: f64) -> Self {
        self.set_price(mint, price);
        self
    }

    pub fn set_price(&self, mint: &str, price: f64) {
        lock(&self.prices).insert(mint.to_string(), price);
    }

    /// Mints quoted so far, in call order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl QuoteProvider for StaticQuoteProvider {
    async fn get_quote(
        &self,
        base_mint: &str,
        token_mint: &str,
        amount: u64,
    ) -> Result<Quote, QuoteError> {
        lock(&self.calls).push(token_mint.to_string());
        let price = lock(&self.prices)
            .get(token_mint)
            .copied()
            .ok_or_else(|| QuoteError::NoQuote(token_mint.to_string()))?;

        let out_amount = if price > 0.0 {
            (amount as f64 / 1e9 / price * 1e6) as u64
        } else {
            0
        };

        Ok(Quote {
            input_mint: base_mint.to_string(),
            output_mint: token_mint.to_string(),
            in_amount: amount,
            out_amount,
            price,
            price_impact_pct: 0.0,
        })
    }
}

/// Payload handler that records everything it is given
#[derive(Debug, Default, Clone)]
pub struct RecordingHandler {
    payloads: Arc<Mutex<Vec<String>>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn payloads(&self) -> Vec<String> {
        lock(&self.payloads).clone()
    }
}

#[async_trait]
impl PayloadHandler for RecordingHandler {
    async fn handle_payload(&self, payload: &str) {
        lock(&self.payloads).push(payload.to_string());
    }
}
