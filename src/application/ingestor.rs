//! Event Ingestor
//!
//! Turns raw feed payloads into tracked tokens: parse, deduplicate by mint,
//! qualify on first sight, then persist the token with its opening price
//! and profit/loss record.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::adapters::pump_fun::{parse_feed_message, FeedMessage, FeedParseError};
use crate::domain::{
    Operation, OperationMetrics, PricePoint, ProfitLoss, QualificationFilter, Rejection,
    TokenCreationEvent, TokenMetrics,
};
use crate::ports::{PayloadHandler, StoreError, TokenStore};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Malformed feed payload: {0}")]
    Parse(#[from] FeedParseError),

    #[error("Failed to persist token {mint}: {source}")]
    Store {
        mint: String,
        #[source]
        source: StoreError,
    },
}

/// What happened to one payload
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// First sight, qualified and persisted
    Tracked(String),
    /// Mint already seen in this process
    Duplicate,
    /// First sight, failed qualification
    Filtered(Rejection),
    /// Subscription acknowledgement or server error notice
    Control,
}

pub struct EventIngestor {
    store: Arc<dyn TokenStore>,
    filter: QualificationFilter,
    seen: Mutex<HashMap<String, TokenMetrics>>,
    metrics: Arc<OperationMetrics>,
}

impl EventIngestor {
    pub fn new(store: Arc<dyn TokenStore>, filter: QualificationFilter) -> Self {
        Self {
            store,
            filter,
            seen: Mutex::new(HashMap::new()),
            metrics: Arc::new(OperationMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<OperationMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Number of distinct mints seen since start
    pub async fn seen_count(&self) -> usize {
        self.seen.lock().await.len()
    }

    /// Metrics computed when `mint` was first seen
    pub async fn seen_metrics(&self, mint: &str) -> Option<TokenMetrics> {
        self.seen.lock().await.get(mint).copied()
    }

    /// Process one raw payload
    pub async fn ingest(&self, raw: &str) -> Result<IngestOutcome, IngestError> {
        let counters = self.metrics.counters();
        counters.record_received();

        let message = parse_feed_message(raw).inspect_err(|_| counters.record_parse_error())?;

        let token = match message {
            FeedMessage::NewToken(token) => token,
            FeedMessage::Confirmation { message } => {
                info!(%message, "Feed acknowledgement");
                counters.record_control();
                return Ok(IngestOutcome::Control);
            }
            FeedMessage::Error { errors } => {
                warn!(%errors, "Feed reported an error");
                counters.record_control();
                return Ok(IngestOutcome::Control);
            }
        };

        let observed_at = Utc::now();
        let event = token
            .into_event(observed_at)
            .inspect_err(|_| counters.record_parse_error())?;
        let metrics = event.metrics(observed_at);

        {
            let mut seen = self.seen.lock().await;
            if seen.contains_key(&event.mint) {
                counters.record_duplicate();
                debug!(mint = event.short_mint(), "Duplicate token, dropping");
                return Ok(IngestOutcome::Duplicate);
            }
            seen.insert(event.mint.clone(), metrics);
        }

        if let Err(rejection) = self.filter.check(&event, &metrics) {
            counters.record_filtered();
            debug!(
                mint = event.short_mint(),
                symbol = %event.symbol,
                reason = %rejection,
                "Token filtered"
            );
            return Ok(IngestOutcome::Filtered(rejection));
        }

        let started = Instant::now();
        let persisted = self.persist(&event).await;
        self.metrics
            .record(Operation::StoreWrite, started.elapsed(), persisted.is_ok());

        if let Err(source) = persisted {
            counters.record_store_error();
            return Err(IngestError::Store {
                mint: event.mint,
                source,
            });
        }

        counters.record_tracked();
        info!(
            mint = %event.mint,
            name = %event.name,
            symbol = %event.symbol,
            market_cap_sol = event.market_cap_sol,
            liquidity_ratio = metrics.liquidity_ratio,
            "Tracking new token"
        );
        Ok(IngestOutcome::Tracked(event.mint))
    }

    /// Token first, then the opening price, then the opening P/L record.
    /// No rollback if a later write fails.
    async fn persist(&self, event: &TokenCreationEvent) -> Result<(), StoreError> {
        self.store.save_token(event).await?;

        let opening = PricePoint::new(event.mint.clone(), event.initial_buy, event.created_at);
        self.store.save_price_point(&opening).await?;

        let record = ProfitLoss::opening(event.mint.clone(), event.initial_buy, event.created_at);
        self.store.upsert_profit_loss(&record).await
    }
}

#[async_trait]
impl PayloadHandler for EventIngestor {
    async fn handle_payload(&self, payload: &str) {
        let started = Instant::now();
        let result = self.ingest(payload).await;
        self.metrics
            .record(Operation::MessageProcessing, started.elapsed(), result.is_ok());

        match result {
            Ok(_) => {}
            Err(IngestError::Parse(e)) => {
                warn!(error = %e, "Dropping malformed feed payload");
            }
            Err(e) => {
                error!(error = %e, "Failed to ingest token");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::mocks::InMemoryStore;
    use approx::assert_relative_eq;

    const MINT: &str = "So11111111111111111111111111111111111111112";
    const OTHER_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn payload(mint: &str, market_cap_sol: f64, v_sol: f64) -> String {
        format!(
            r#"{{
                "signature": "5xSig",
                "mint": "{mint}",
                "traderPublicKey": "Creator456",
                "txType": "create",
                "initialBuy": 62500000.0,
                "solAmount": 1.5,
                "bondingCurveKey": "Curve789",
                "vTokensInBondingCurve": 1000000000.0,
                "vSolInBondingCurve": {v_sol},
                "marketCapSol": {market_cap_sol},
                "name": "Test Meme",
                "symbol": "MEME",
                "uri": "https://ipfs.io/ipfs/abc"
            }}"#
        )
    }

    fn ingestor(store: &InMemoryStore) -> EventIngestor {
        EventIngestor::new(Arc::new(store.clone()), QualificationFilter::new(20.0, 10.0))
    }

    #[tokio::test]
    async fn test_qualified_token_is_persisted() {
        let store = InMemoryStore::new();
        let ingestor = ingestor(&store);

        let outcome = ingestor.ingest(&payload(MINT, 30.0, 30.0)).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Tracked(MINT.to_string()));

        assert_eq!(store.tokens().len(), 1);

        let prices = store.price_points();
        assert_eq!(prices.len(), 1);
        assert_relative_eq!(prices[0].price, 62_500_000.0);
        assert_eq!(prices[0].timestamp, store.tokens()[0].created_at);

        let record = store.profit_loss_for(MINT).unwrap();
        assert_relative_eq!(record.initial_price, 62_500_000.0);
        assert_relative_eq!(record.current_price, 62_500_000.0);
        assert_eq!(record.profit_loss, 0.0);
        assert_eq!(record.profit_loss_pct, 0.0);
    }

    #[tokio::test]
    async fn test_same_payload_twice_persists_once() {
        let store = InMemoryStore::new();
        let ingestor = ingestor(&store);
        let raw = payload(MINT, 30.0, 30.0);

        ingestor.ingest(&raw).await.unwrap();
        let second = ingestor.ingest(&raw).await.unwrap();

        assert_eq!(second, IngestOutcome::Duplicate);
        assert_eq!(store.save_token_calls(), 1);
        assert_eq!(store.price_points().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_duplicates_write_once() {
        let store = InMemoryStore::new();
        let ingestor = Arc::new(ingestor(&store));
        let raw = payload(MINT, 30.0, 30.0);

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ingestor = Arc::clone(&ingestor);
                let raw = raw.clone();
                tokio::spawn(async move { ingestor.ingest(&raw).await.unwrap() })
            })
            .collect();

        let mut tracked = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), IngestOutcome::Tracked(_)) {
                tracked += 1;
            }
        }

        assert_eq!(tracked, 1);
        assert_eq!(store.save_token_calls(), 1);
        assert_eq!(ingestor.seen_count().await, 1);
    }

    #[tokio::test]
    async fn test_low_market_cap_is_filtered() {
        let store = InMemoryStore::new();
        let ingestor = ingestor(&store);

        let outcome = ingestor.ingest(&payload(MINT, 5.0, 30.0)).await.unwrap();
        assert!(matches!(
            outcome,
            IngestOutcome::Filtered(Rejection::MarketCapBelowMinimum { .. })
        ));
        assert!(store.tokens().is_empty());
        assert!(store.price_points().is_empty());

        // Filtered mints are still remembered
        let again = ingestor.ingest(&payload(MINT, 500.0, 300.0)).await.unwrap();
        assert_eq!(again, IngestOutcome::Duplicate);
    }

    #[tokio::test]
    async fn test_low_liquidity_ratio_is_filtered() {
        let store = InMemoryStore::new();
        let ingestor = ingestor(&store);

        // 15 SOL in curve against a 200 SOL market cap
        let outcome = ingestor.ingest(&payload(MINT, 200.0, 15.0)).await.unwrap();
        assert!(matches!(
            outcome,
            IngestOutcome::Filtered(Rejection::LiquidityRatioTooLow { .. })
        ));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_parse_error() {
        let store = InMemoryStore::new();
        let ingestor = ingestor(&store);

        let result = ingestor.ingest("{not json").await;
        assert!(matches!(result, Err(IngestError::Parse(_))));
        assert_eq!(ingestor.seen_count().await, 0);

        let snapshot = ingestor.metrics.counters().snapshot();
        assert_eq!(snapshot.received, 1);
        assert_eq!(snapshot.parse_errors, 1);
    }

    #[tokio::test]
    async fn test_control_messages_are_not_tokens() {
        let store = InMemoryStore::new();
        let ingestor = ingestor(&store);

        let ack = r#"{"message":"Successfully subscribed to token creation events."}"#;
        assert_eq!(ingestor.ingest(ack).await.unwrap(), IngestOutcome::Control);
        assert_eq!(ingestor.seen_count().await, 0);
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_without_rollback() {
        let store = InMemoryStore::new().failing_price_points();
        let ingestor = ingestor(&store);

        let result = ingestor.ingest(&payload(MINT, 30.0, 30.0)).await;
        assert!(matches!(result, Err(IngestError::Store { ref mint, .. }) if mint == MINT));

        // Token row stays, no P/L record was reached
        assert_eq!(store.tokens().len(), 1);
        assert!(store.profit_loss_for(MINT).is_none());
    }

    #[tokio::test]
    async fn test_failed_token_write_is_not_retried_on_redelivery() {
        let store = InMemoryStore::new().failing_tokens();
        let ingestor = ingestor(&store);
        let raw = payload(MINT, 30.0, 30.0);

        let result = ingestor.ingest(&raw).await;
        assert!(matches!(result, Err(IngestError::Store { ref mint, .. }) if mint == MINT));
        assert!(store.tokens().is_empty());
        assert!(store.price_points().is_empty());

        assert_eq!(ingestor.ingest(&raw).await.unwrap(), IngestOutcome::Duplicate);
        assert_eq!(store.save_token_calls(), 1);
    }

    #[tokio::test]
    async fn test_handler_swallows_errors() {
        let store = InMemoryStore::new();
        let ingestor = ingestor(&store);

        ingestor.handle_payload("garbage").await;
        ingestor.handle_payload(&payload(OTHER_MINT, 30.0, 30.0)).await;

        assert_eq!(store.tokens().len(), 1);
        assert_eq!(
            ingestor.metrics.success_rate(Operation::MessageProcessing, std::time::Duration::from_secs(60)),
            50.0
        );
    }

    #[tokio::test]
    async fn test_seen_metrics_recorded() {
        let store = InMemoryStore::new();
        let ingestor = ingestor(&store);
        ingestor.ingest(&payload(MINT, 60.0, 30.0)).await.unwrap();

        let metrics = ingestor.seen_metrics(MINT).await.unwrap();
        assert_relative_eq!(metrics.liquidity_ratio, 0.5);
        assert!(ingestor.seen_metrics(OTHER_MINT).await.is_none());
    }
}
