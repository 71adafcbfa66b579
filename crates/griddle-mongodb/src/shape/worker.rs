//! Background task owning the flush cadence
//!
//! Request paths only perform the in-memory increment. The worker flushes
//! on a fixed interval, early when the cache signals that the interval has
//! elapsed, and a final time on shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::cache::FrequencyCache;
use super::flush::{flush, FlushReport};
use super::store::ShapeCounterStore;

/// Shortest period the worker will tick at
const MIN_TICK: Duration = Duration::from_millis(10);

/// Handle to the running flush task
pub struct ShapeFlushWorker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl ShapeFlushWorker {
    /// Spawn the flush loop on the current tokio runtime
    pub fn spawn(cache: Arc<FrequencyCache>, store: Arc<dyn ShapeCounterStore>) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            Self::run(cache, store, token).await;
        });

        Self { cancel, handle }
    }

    async fn run(
        cache: Arc<FrequencyCache>,
        store: Arc<dyn ShapeCounterStore>,
        cancel: CancellationToken,
    ) {
        let period = cache.flush_interval().max(MIN_TICK);
        let signal = cache.flush_signal();

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        tracing::info!(interval_ms = period.as_millis() as u64, "Query shape flush worker started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = signal.notified() => {
                    ticker.reset();
                }
            }

            log_report(&flush(&cache, store.as_ref()).await);
        }

        let report = flush(&cache, store.as_ref()).await;
        log_report(&report);
        tracing::info!(processed = report.processed, "Query shape flush worker stopped");
    }

    /// Whether the loop is still running
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the loop after a final flush and wait for it
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Query shape flush worker panicked");
        }
    }
}

fn log_report(report: &FlushReport) {
    if report.processed == 0 {
        return;
    }
    if report.is_clean() {
        tracing::debug!(processed = report.processed, "Query shapes persisted");
    } else {
        tracing::warn!(
            processed = report.processed,
            failed = report.failures.len(),
            "Query shape flush finished with failures"
        );
    }
}
