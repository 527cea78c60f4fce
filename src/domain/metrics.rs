//! Pipeline Metrics
//!
//! Timed samples per operation with windowed latency and success-rate
//! queries, plus monotonic counters for the ingestion and monitoring
//! pipelines.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Operations whose duration and outcome are sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FeedConnect,
    FeedSubscribe,
    MessageProcessing,
    PriceCheck,
    StoreWrite,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::FeedConnect => "feed_connect",
            Operation::FeedSubscribe => "feed_subscribe",
            Operation::MessageProcessing => "message_processing",
            Operation::PriceCheck => "price_check",
            Operation::StoreWrite => "store_write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    operation: Operation,
    duration: Duration,
    recorded_at: Instant,
    success: bool,
}

/// Duration samples per operation and the pipeline counters
#[derive(Debug, Default)]
pub struct OperationMetrics {
    samples: RwLock<Vec<Sample>>,
    counters: PipelineCounters,
}

impl OperationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> &PipelineCounters {
        &self.counters
    }

    pub fn record(&self, operation: Operation, duration: Duration, success: bool) {
        self.record_at(operation, duration, success, Instant::now());
    }

    pub fn record_at(
        &self,
        operation: Operation,
        duration: Duration,
        success: bool,
        recorded_at: Instant,
    ) {
        self.write().push(Sample {
            operation,
            duration,
            recorded_at,
            success,
        });
    }

    /// Mean duration of successful samples recorded within `window`.
    ///
    /// Zero when there are none.
    pub fn average_latency(&self, operation: Operation, window: Duration) -> Duration {
        let samples = self.read();
        let (total, count) = samples
            .iter()
            .filter(|s| s.operation == operation && s.success && within(s, window))
            .fold((Duration::ZERO, 0u32), |(total, count), s| {
                (total + s.duration, count + 1)
            });

        if count == 0 {
            Duration::ZERO
        } else {
            total / count
        }
    }

    /// Percentage (0-100) of samples within `window` that succeeded.
    ///
    /// Zero when there are none.
    pub fn success_rate(&self, operation: Operation, window: Duration) -> f64 {
        let samples = self.read();
        let (total, successful) = samples
            .iter()
            .filter(|s| s.operation == operation && within(s, window))
            .fold((0usize, 0usize), |(total, ok), s| {
                (total + 1, ok + usize::from(s.success))
            });

        if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64 * 100.0
        }
    }

    /// Drop samples older than `retention`
    pub fn prune(&self, retention: Duration) {
        self.write().retain(|s| within(s, retention));
    }

    pub fn sample_count(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Sample>> {
        self.samples.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Sample>> {
        self.samples.write().unwrap_or_else(|p| p.into_inner())
    }
}

fn within(sample: &Sample, window: Duration) -> bool {
    sample.recorded_at.elapsed() <= window
}

/// Monotonic event counters
#[derive(Debug, Default)]
pub struct PipelineCounters {
    received: AtomicU64,
    tracked: AtomicU64,
    filtered: AtomicU64,
    duplicates: AtomicU64,
    control: AtomicU64,
    parse_errors: AtomicU64,
    store_errors: AtomicU64,
    quotes_ok: AtomicU64,
    quotes_failed: AtomicU64,
    reconnects: AtomicU64,
}

impl PipelineCounters {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tracked(&self) {
        self.tracked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_control(&self) {
        self.control.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_quote(&self, success: bool) {
        if success {
            self.quotes_ok.fetch_add(1, Ordering::Relaxed);
        } else {
            self.quotes_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            received: self.received.load(Ordering::Relaxed),
            tracked: self.tracked.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            control: self.control.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            quotes_ok: self.quotes_ok.load(Ordering::Relaxed),
            quotes_failed: self.quotes_failed.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub received: u64,
    pub tracked: u64,
    pub filtered: u64,
    pub duplicates: u64,
    pub control: u64,
    pub parse_errors: u64,
    pub store_errors: u64,
    pub quotes_ok: u64,
    pub quotes_failed: u64,
    pub reconnects: u64,
}
