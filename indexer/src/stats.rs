//! In-process counters summarising the work of the pipeline.
//!
//! Metrics exported through the `metrics` facade are meant for scraping; these counters back
//! the periodic summary written to the log when stats reporting is enabled.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::concurrency::shutdown::{ShutdownRx, wait_for_shutdown};

#[derive(Debug, Default)]
struct Counters {
    batches: AtomicU64,
    rows_added: AtomicU64,
    rows_updated: AtomicU64,
    rows_removed: AtomicU64,
    rows_skipped: AtomicU64,
    poll_errors: AtomicU64,
    bulk_requests: AtomicU64,
    bulk_operations: AtomicU64,
    bulk_bytes: AtomicU64,
    resolve_micros: AtomicU64,
    compile_micros: AtomicU64,
    delivery_micros: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub batches: u64,
    pub rows_added: u64,
    pub rows_updated: u64,
    pub rows_removed: u64,
    pub rows_skipped: u64,
    pub poll_errors: u64,
    pub bulk_requests: u64,
    pub bulk_operations: u64,
    pub bulk_bytes: u64,
    pub resolve_time: Duration,
    pub compile_time: Duration,
    pub delivery_time: Duration,
}

impl StatsSnapshot {
    fn average(total: Duration, count: u64) -> Duration {
        if count == 0 {
            Duration::ZERO
        } else {
            total / count as u32
        }
    }

    pub fn average_resolve_time(&self) -> Duration {
        Self::average(self.resolve_time, self.batches)
    }

    pub fn average_compile_time(&self) -> Duration {
        Self::average(self.compile_time, self.batches)
    }

    pub fn average_delivery_time(&self) -> Duration {
        Self::average(self.delivery_time, self.batches)
    }
}

/// Shared counters, cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    counters: Arc<Counters>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_batch(&self, added: usize, updated: usize, removed: usize) {
        let counters = &self.counters;
        counters.batches.fetch_add(1, Ordering::Relaxed);
        counters
            .rows_added
            .fetch_add(added as u64, Ordering::Relaxed);
        counters
            .rows_updated
            .fetch_add(updated as u64, Ordering::Relaxed);
        counters
            .rows_removed
            .fetch_add(removed as u64, Ordering::Relaxed);
    }

    pub fn record_times(&self, resolve: Duration, compile: Duration, delivery: Duration) {
        let counters = &self.counters;
        counters
            .resolve_micros
            .fetch_add(resolve.as_micros() as u64, Ordering::Relaxed);
        counters
            .compile_micros
            .fetch_add(compile.as_micros() as u64, Ordering::Relaxed);
        counters
            .delivery_micros
            .fetch_add(delivery.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_skipped(&self, rows: usize) {
        self.counters
            .rows_skipped
            .fetch_add(rows as u64, Ordering::Relaxed);
    }

    pub fn record_poll_error(&self) {
        self.counters.poll_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bulk_request(&self, operations: usize, bytes: usize) {
        let counters = &self.counters;
        counters.bulk_requests.fetch_add(1, Ordering::Relaxed);
        counters
            .bulk_operations
            .fetch_add(operations as u64, Ordering::Relaxed);
        counters
            .bulk_bytes
            .fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let counters = &self.counters;
        StatsSnapshot {
            batches: counters.batches.load(Ordering::Relaxed),
            rows_added: counters.rows_added.load(Ordering::Relaxed),
            rows_updated: counters.rows_updated.load(Ordering::Relaxed),
            rows_removed: counters.rows_removed.load(Ordering::Relaxed),
            rows_skipped: counters.rows_skipped.load(Ordering::Relaxed),
            poll_errors: counters.poll_errors.load(Ordering::Relaxed),
            bulk_requests: counters.bulk_requests.load(Ordering::Relaxed),
            bulk_operations: counters.bulk_operations.load(Ordering::Relaxed),
            bulk_bytes: counters.bulk_bytes.load(Ordering::Relaxed),
            resolve_time: Duration::from_micros(counters.resolve_micros.load(Ordering::Relaxed)),
            compile_time: Duration::from_micros(counters.compile_micros.load(Ordering::Relaxed)),
            delivery_time: Duration::from_micros(
                counters.delivery_micros.load(Ordering::Relaxed),
            ),
        }
    }

    /// Logs a summary of the counters.
    pub fn log_summary(&self) {
        let snapshot = self.snapshot();
        info!(
            batches = snapshot.batches,
            rows_added = snapshot.rows_added,
            rows_updated = snapshot.rows_updated,
            rows_removed = snapshot.rows_removed,
            rows_skipped = snapshot.rows_skipped,
            poll_errors = snapshot.poll_errors,
            bulk_requests = snapshot.bulk_requests,
            bulk_operations = snapshot.bulk_operations,
            bulk_bytes = snapshot.bulk_bytes,
            avg_resolve_ms = snapshot.average_resolve_time().as_secs_f64() * 1000.0,
            avg_compile_ms = snapshot.average_compile_time().as_secs_f64() * 1000.0,
            avg_delivery_ms = snapshot.average_delivery_time().as_secs_f64() * 1000.0,
            "pipeline stats"
        );
    }
}

/// Logs a summary every `interval` until shutdown is requested.
pub fn spawn_stats_reporter(
    stats: PipelineStats,
    interval: Duration,
    mut shutdown_rx: ShutdownRx,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;

                _ = wait_for_shutdown(&mut shutdown_rx) => break,
                _ = ticker.tick() => stats.log_summary(),
            }
        }
    })
}
