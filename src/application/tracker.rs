//! Tracker
//!
//! Wires the feed connection, event ingestor and price monitor around a
//! shared store, and owns startup and shutdown of their tasks.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::ingestor::EventIngestor;
use super::price_monitor::{PriceMonitor, PriceMonitorConfig};
use crate::adapters::pump_fun::{ConnectionConfig, ConnectionManager, ConnectionState, FeedError};
use crate::domain::{CountersSnapshot, Operation, OperationMetrics, QualificationFilter};
use crate::ports::{QuoteProvider, TokenStore};

/// How often operation metrics are summarised and pruned
const METRICS_REPORT_INTERVAL: Duration = Duration::from_secs(300);
/// Samples older than this are dropped
const METRICS_RETENTION: Duration = Duration::from_secs(3600);
/// Upper bound on waiting for tasks during shutdown
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Feed unavailable: {0}")]
    Feed(#[from] FeedError),
    #[error("Tracker already started")]
    AlreadyStarted,
    #[error("Tracker has been shut down")]
    ShutDown,
}

#[derive(Debug, Clone)]
pub struct TrackerStatus {
    pub connection: ConnectionState,
    pub reconnects: u32,
    pub tokens_seen: usize,
    pub counters: CountersSnapshot,
}

#[derive(Default)]
struct Lifecycle {
    started: bool,
    stopped: bool,
    tasks: Vec<JoinHandle<()>>,
}

pub struct Tracker {
    connection: ConnectionManager,
    ingestor: Arc<EventIngestor>,
    monitor: Arc<PriceMonitor>,
    metrics: Arc<OperationMetrics>,
    cancel: CancellationToken,
    lifecycle: Mutex<Lifecycle>,
}

impl Tracker {
    pub fn new(
        connection_config: ConnectionConfig,
        monitor_config: PriceMonitorConfig,
        filter: QualificationFilter,
        store: Arc<dyn TokenStore>,
        quotes: Arc<dyn QuoteProvider>,
    ) -> Self {
        let metrics = Arc::new(OperationMetrics::new());
        let cancel = CancellationToken::new();

        let ingestor = Arc::new(
            EventIngestor::new(Arc::clone(&store), filter).with_metrics(Arc::clone(&metrics)),
        );
        let monitor = Arc::new(
            PriceMonitor::new(monitor_config, store, quotes).with_metrics(Arc::clone(&metrics)),
        );
        let connection = ConnectionManager::new(
            connection_config,
            ingestor.clone(),
            cancel.clone(),
        )
        .with_metrics(Arc::clone(&metrics));

        Self {
            connection,
            ingestor,
            monitor,
            metrics,
            cancel,
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Connect to the feed and start the streaming, polling and metrics
    /// tasks. Fails if the first feed connection cannot be established.
    pub async fn start(&self) -> Result<(), TrackerError> {
        {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.stopped {
                return Err(TrackerError::ShutDown);
            }
            if lifecycle.started {
                return Err(TrackerError::AlreadyStarted);
            }
            lifecycle.started = true;
        }

        let feed = match self.connection.start().await {
            Ok(feed) => feed,
            Err(e) => {
                self.lifecycle.lock().await.started = false;
                return Err(e.into());
            }
        };

        let monitor = Arc::clone(&self.monitor);
        let cancel = self.cancel.clone();
        let poller = tokio::spawn(async move { monitor.run(cancel).await });

        let metrics = Arc::clone(&self.metrics);
        let cancel = self.cancel.clone();
        let reporter = tokio::spawn(async move { report_metrics(metrics, cancel).await });

        self.lifecycle
            .lock()
            .await
            .tasks
            .extend([feed, poller, reporter]);

        info!("Tracker started");
        Ok(())
    }

    /// Stop every task. Safe to call more than once.
    pub async fn shutdown(&self) {
        let tasks = {
            let mut lifecycle = self.lifecycle.lock().await;
            if lifecycle.stopped {
                debug!("Shutdown already requested");
                return;
            }
            lifecycle.stopped = true;
            std::mem::take(&mut lifecycle.tasks)
        };

        info!("Shutting down tracker");
        if let Err(e) = self.connection.close().await {
            debug!(error = %e, "Feed connection already closed");
        }
        self.cancel.cancel();

        for task in tasks {
            join_within(task, SHUTDOWN_GRACE).await;
        }

        let counters = self.metrics.counters().snapshot();
        info!(
            received = counters.received,
            tracked = counters.tracked,
            filtered = counters.filtered,
            duplicates = counters.duplicates,
            parse_errors = counters.parse_errors,
            quotes_ok = counters.quotes_ok,
            quotes_failed = counters.quotes_failed,
            reconnects = counters.reconnects,
            "Tracker stopped"
        );
    }

    pub async fn status(&self) -> TrackerStatus {
        TrackerStatus {
            connection: self.connection.state().await,
            reconnects: self.connection.reconnect_count().await,
            tokens_seen: self.ingestor.seen_count().await,
            counters: self.metrics.counters().snapshot(),
        }
    }

    pub fn metrics(&self) -> Arc<OperationMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Signal shared by every task the tracker owns
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Wait up to `grace` for a task, aborting it if it is still running.
/// Returns whether the task stopped on its own.
async fn join_within(mut task: JoinHandle<()>, grace: Duration) -> bool {
    match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!(error = %e, "Task ended abnormally");
            true
        }
        Err(_) => {
            warn!("Task did not stop within the grace period, aborting");
            task.abort();
            false
        }
    }
}

async fn report_metrics(metrics: Arc<OperationMetrics>, cancel: CancellationToken) {
    let start = tokio::time::Instant::now() + METRICS_REPORT_INTERVAL;
    let mut ticker = tokio::time::interval_at(start, METRICS_REPORT_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                for op in [Operation::PriceCheck, Operation::MessageProcessing, Operation::StoreWrite] {
                    info!(
                        operation = %op,
                        avg_latency_ms = metrics.average_latency(op, METRICS_REPORT_INTERVAL).as_millis() as u64,
                        success_rate = metrics.success_rate(op, METRICS_REPORT_INTERVAL),
                        "Operation metrics"
                    );
                }
                metrics.prune(METRICS_RETENTION);
                debug!(samples = metrics.sample_count(), "Pruned operation samples");
            }
        }
    }
}
