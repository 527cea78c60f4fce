//! Price Monitor
//!
//! Polls the quote provider for the most recently tracked tokens on a fixed
//! interval, records each price and refreshes the token's profit/loss.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::profit_loss::ProfitLossCalculator;
use crate::domain::{short_mint, Operation, OperationMetrics, PricePoint};
use crate::ports::{QuoteError, QuoteProvider, StoreError, TokenStore, DEFAULT_PROBE_LAMPORTS, SOL_MINT};

#[derive(Debug, Clone)]
pub struct PriceMonitorConfig {
    /// Time between polling rounds
    pub interval: Duration,
    /// Most recent tokens checked per round
    pub queue_size: usize,
    /// Base asset amount quoted per check, in its smallest unit
    pub probe_amount: u64,
    pub base_mint: String,
    /// Per-quote deadline; `None` leaves it to the provider
    pub quote_timeout: Option<Duration>,
}

impl Default for PriceMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            queue_size: 50,
            probe_amount: DEFAULT_PROBE_LAMPORTS,
            base_mint: SOL_MINT.to_string(),
            quote_timeout: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum PriceCheckError {
    #[error("Quote failed: {0}")]
    Quote(#[from] QuoteError),
    #[error("Store failed: {0}")]
    Store(#[from] StoreError),
    #[error("Cancelled")]
    Cancelled,
}

/// Result of one polling round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Tokens loaded from the queue
    pub queued: usize,
    /// Tokens with a new price recorded
    pub priced: usize,
    /// Tokens skipped because a quote or write failed
    pub skipped: usize,
    /// Round stopped early by shutdown
    pub aborted: bool,
}

pub struct PriceMonitor {
    config: PriceMonitorConfig,
    store: Arc<dyn TokenStore>,
    quotes: Arc<dyn QuoteProvider>,
    calculator: ProfitLossCalculator,
    metrics: Arc<OperationMetrics>,
}

impl PriceMonitor {
    pub fn new(
        config: PriceMonitorConfig,
        store: Arc<dyn TokenStore>,
        quotes: Arc<dyn QuoteProvider>,
    ) -> Self {
        let calculator = ProfitLossCalculator::new(Arc::clone(&store));
        Self {
            config,
            store,
            quotes,
            calculator,
            metrics: Arc::new(OperationMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<OperationMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn config(&self) -> &PriceMonitorConfig {
        &self.config
    }

    /// Poll every `interval` until `cancel` fires.
    ///
    /// The first round runs one interval after start.
    pub async fn run(&self, cancel: CancellationToken) {
        let start = tokio::time::Instant::now() + self.config.interval;
        let mut ticker = tokio::time::interval_at(start, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.interval.as_secs_f64(),
            queue_size = self.config.queue_size,
            "Price monitor started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick(&cancel).await {
                        Ok(report) => debug!(
                            queued = report.queued,
                            priced = report.priced,
                            skipped = report.skipped,
                            aborted = report.aborted,
                            "Price round complete"
                        ),
                        Err(e) => warn!(error = %e, "Failed to load tracked tokens"),
                    }
                }
            }
        }

        info!("Price monitor stopped");
    }

    /// One polling round over the most recent tokens, in queue order.
    pub async fn tick(&self, cancel: &CancellationToken) -> Result<TickReport, StoreError> {
        let tokens = self.store.get_recent_tokens(self.config.queue_size).await?;
        let mut report = TickReport {
            queued: tokens.len(),
            ..Default::default()
        };

        for token in &tokens {
            if cancel.is_cancelled() {
                report.aborted = true;
                break;
            }

            match self.check_price(&token.mint, cancel).await {
                Ok(price) => {
                    report.priced += 1;
                    debug!(mint = token.short_mint(), price, "Price recorded");
                }
                Err(PriceCheckError::Cancelled) => {
                    report.aborted = true;
                    break;
                }
                Err(e) => {
                    report.skipped += 1;
                    warn!(mint = %token.mint, error = %e, "Skipping price check");
                }
            }
        }

        Ok(report)
    }

    /// Quote, record and recompute for a single token
    pub async fn check_price(
        &self,
        mint: &str,
        cancel: &CancellationToken,
    ) -> Result<f64, PriceCheckError> {
        let started = Instant::now();
        let quote = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PriceCheckError::Cancelled),
            quote = self.request_quote(mint) => quote,
        };
        self.metrics
            .record(Operation::PriceCheck, started.elapsed(), quote.is_ok());
        self.metrics.counters().record_quote(quote.is_ok());
        let quote = quote?;

        let point = PricePoint::new(mint, quote.price, Utc::now());
        self.store.save_price_point(&point).await?;
        self.calculator.recompute(mint).await?;

        debug!(
            mint = short_mint(mint),
            out_amount = quote.out_amount,
            impact = quote.price_impact_pct,
            "Quote"
        );
        Ok(quote.price)
    }

    async fn request_quote(&self, mint: &str) -> Result<crate::ports::Quote, QuoteError> {
        let request = self
            .quotes
            .get_quote(&self.config.base_mint, mint, self.config.probe_amount);

        match self.config.quote_timeout {
            Some(limit) => tokio::time::timeout(limit, request)
                .await
                .map_err(|_| QuoteError::Timeout(limit))?,
            None => request.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TokenCreationEvent;
    use crate::ports::mocks::{InMemoryStore, StaticQuoteProvider};
    use crate::ports::quote::{MockQuoteProvider, Quote};
    use approx::assert_relative_eq;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;

    fn token(mint: &str, age_secs: i64) -> TokenCreationEvent {
        TokenCreationEvent {
            mint: mint.to_string(),
            name: format!("Token {mint}"),
            symbol: "TKN".to_string(),
            bonding_curve_key: "Curve".to_string(),
            v_sol_in_bonding_curve: 30.0,
            v_tokens_in_bonding_curve: 1_000_000_000.0,
            initial_buy: 1.0,
            market_cap_sol: 30.0,
            sol_amount: 1.0,
            signature: "sig".to_string(),
            trader_public_key: "trader".to_string(),
            tx_type: "create".to_string(),
            uri: String::new(),
            created_at: Utc::now() - ChronoDuration::seconds(age_secs),
        }
    }

    /// Store holding tokens that each have an opening price of 1.0
    async fn seeded_store(mints: &[&str]) -> InMemoryStore {
        let store = InMemoryStore::new();
        for (i, mint) in mints.iter().enumerate() {
            let event = token(mint, 100 - i as i64);
            store.save_token(&event).await.unwrap();
            store
                .save_price_point(&PricePoint::new(*mint, 1.0, event.created_at))
                .await
                .unwrap();
        }
        store
    }

    fn monitor(store: &InMemoryStore, quotes: Arc<dyn QuoteProvider>) -> PriceMonitor {
        PriceMonitor::new(PriceMonitorConfig::default(), Arc::new(store.clone()), quotes)
    }

    #[tokio::test]
    async fn test_tick_records_prices_and_profit_loss() {
        let store = seeded_store(&["MintA", "MintB"]).await;
        let quotes = StaticQuoteProvider::new()
            .with_price("MintA", 1.5)
            .with_price("MintB", 0.5);

        let report = monitor(&store, Arc::new(quotes))
            .tick(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report, TickReport { queued: 2, priced: 2, skipped: 0, aborted: false });

        let a = store.profit_loss_for("MintA").unwrap();
        assert_relative_eq!(a.profit_loss_pct, 50.0);
        let b = store.profit_loss_for("MintB").unwrap();
        assert_relative_eq!(b.profit_loss_pct, -50.0);
    }

    #[tokio::test]
    async fn test_quote_failure_skips_token() {
        let store = seeded_store(&["MintA", "MintB", "MintC"]).await;

        let mut quotes = MockQuoteProvider::new();
        quotes
            .expect_get_quote()
            .times(3)
            .returning(|base, mint, amount| {
                if mint == "MintB" {
                    return Err(QuoteError::NoQuote(mint.to_string()));
                }
                Ok(Quote {
                    input_mint: base.to_string(),
                    output_mint: mint.to_string(),
                    in_amount: amount,
                    out_amount: 1_000_000,
                    price: 2.0,
                    price_impact_pct: 0.0,
                })
            });

        let report = monitor(&store, Arc::new(quotes))
            .tick(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.priced, 2);
        assert_eq!(report.skipped, 1);
        assert!(store.profit_loss_for("MintB").is_none());
        assert!(store.profit_loss_for("MintC").is_some());
    }

    #[tokio::test]
    async fn test_uses_probe_amount_and_base_mint() {
        let store = seeded_store(&["MintA"]).await;

        let mut quotes = MockQuoteProvider::new();
        quotes
            .expect_get_quote()
            .withf(|base, mint, amount| base == SOL_MINT && mint == "MintA" && *amount == 100_000)
            .times(1)
            .returning(|_, mint, _| Err(QuoteError::NoQuote(mint.to_string())));

        monitor(&store, Arc::new(quotes))
            .tick(&CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_store_write_failure_skips_token() {
        let store = seeded_store(&["MintA"]).await;
        let failing = store.clone().failing_price_points();
        let quotes = StaticQuoteProvider::new().with_price("MintA", 2.0);

        let report = monitor(&failing, Arc::new(quotes))
            .tick(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.skipped, 1);
        assert_eq!(report.priced, 0);
    }

    /// Cancels shutdown on its first quote
    struct CancelOnFirstQuote {
        cancel: CancellationToken,
        inner: StaticQuoteProvider,
    }

    #[async_trait]
    impl QuoteProvider for CancelOnFirstQuote {
        async fn get_quote(
            &self,
            base_mint: &str,
            token_mint: &str,
            amount: u64,
        ) -> Result<Quote, QuoteError> {
            self.cancel.cancel();
            self.inner.get_quote(base_mint, token_mint, amount).await
        }
    }

    #[tokio::test]
    async fn test_cancellation_aborts_remaining_tokens() {
        let store = seeded_store(&["MintA", "MintB", "MintC"]).await;
        let cancel = CancellationToken::new();
        let inner = StaticQuoteProvider::new()
            .with_price("MintA", 1.0)
            .with_price("MintB", 1.0)
            .with_price("MintC", 1.0);
        let quotes = CancelOnFirstQuote {
            cancel: cancel.clone(),
            inner: inner.clone(),
        };

        let report = monitor(&store, Arc::new(quotes)).tick(&cancel).await.unwrap();

        assert!(report.aborted);
        assert_eq!(report.priced, 1);
        assert_eq!(inner.calls().len(), 1);
    }

    struct SlowQuotes;

    #[async_trait]
    impl QuoteProvider for SlowQuotes {
        async fn get_quote(&self, _: &str, mint: &str, _: u64) -> Result<Quote, QuoteError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(QuoteError::NoQuote(mint.to_string()))
        }
    }

    #[tokio::test]
    async fn test_quote_timeout_skips_token() {
        let store = seeded_store(&["MintA"]).await;
        let config = PriceMonitorConfig {
            quote_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let monitor = PriceMonitor::new(config, Arc::new(store.clone()), Arc::new(SlowQuotes));

        let report = monitor.tick(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_quote_timeout_reports_sub_second_limit() {
        let store = InMemoryStore::new();
        let config = PriceMonitorConfig {
            quote_timeout: Some(Duration::from_millis(20)),
            ..Default::default()
        };
        let monitor = PriceMonitor::new(config, Arc::new(store), Arc::new(SlowQuotes));

        let err = monitor.request_quote("MintA").await.unwrap_err();
        assert!(matches!(err, QuoteError::Timeout(limit) if limit == Duration::from_millis(20)));
        assert_eq!(err.to_string(), "Quote request timed out after 20ms");
    }

    #[tokio::test]
    async fn test_cancel_interrupts_in_flight_quote() {
        let store = seeded_store(&["MintA"]).await;
        let monitor = Arc::new(monitor(&store, Arc::new(SlowQuotes)));
        let cancel = CancellationToken::new();

        let handle = {
            let monitor = Arc::clone(&monitor);
            let cancel = cancel.clone();
            tokio::spawn(async move { monitor.tick(&cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let report = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(report.aborted);
    }

    #[tokio::test]
    async fn test_run_polls_until_cancelled() {
        let store = seeded_store(&["MintA"]).await;
        let quotes = StaticQuoteProvider::new().with_price("MintA", 1.2);
        let config = PriceMonitorConfig {
            interval: Duration::from_millis(20),
            ..Default::default()
        };
        let monitor = PriceMonitor::new(config, Arc::new(store.clone()), Arc::new(quotes.clone()));
        let cancel = CancellationToken::new();

        let handle = {
            let cancel = cancel.clone();
            tokio::spawn(async move { monitor.run(cancel).await })
        };

        tokio::time::timeout(Duration::from_secs(5), async {
            while quotes.calls().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        // Opening price plus at least two polled prices
        assert!(store.price_points().len() >= 3);
    }

    #[tokio::test]
    async fn test_run_exits_immediately_when_cancelled() {
        let store = InMemoryStore::new();
        let config = PriceMonitorConfig {
            interval: Duration::from_secs(3600),
            ..Default::default()
        };
        let monitor = PriceMonitor::new(
            config,
            Arc::new(store),
            Arc::new(StaticQuoteProvider::new()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();

        tokio::time::timeout(Duration::from_millis(500), monitor.run(cancel))
            .await
            .unwrap();
    }
}
