//! Reconcile buffered shape counts with the counter store

use futures::future::join_all;
use griddle_common::{GriddleError, Result};
use std::time::{Duration, Instant};

use super::cache::FrequencyCache;
use super::record::QueryShapeRecord;
use super::store::ShapeCounterStore;

/// A shape whose count could not be persisted
#[derive(Debug, Clone)]
pub struct ShapeFlushFailure {
    pub ordered_key: String,
    /// Count that was not persisted
    pub delta: i64,
    pub error: GriddleError,
}

/// Outcome of one flush
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Shapes taken from the cache
    pub processed: usize,
    /// Shapes persisted successfully
    pub persisted: usize,
    pub failures: Vec<ShapeFlushFailure>,
    pub elapsed: Duration,
}

impl FlushReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

async fn persist_entry<S>(store: &S, record: &QueryShapeRecord) -> Result<()>
where
    S: ShapeCounterStore + ?Sized,
{
    match store.find_one(&record.ordered_key).await? {
        Some(_) => store.increment(&record.ordered_key, record.occurrence_count).await,
        None => store.insert(record).await,
    }
}

/// Drain the cache into the store.
///
/// Every shape is persisted concurrently; one failing shape does not stop
/// the others. Failed counts are reported, not retried.
pub async fn flush<S>(cache: &FrequencyCache, store: &S) -> FlushReport
where
    S: ShapeCounterStore + ?Sized,
{
    let started = Instant::now();
    let snapshot = cache.take_snapshot();

    if snapshot.is_empty() {
        return FlushReport {
            elapsed: started.elapsed(),
            ..FlushReport::default()
        };
    }

    let processed = snapshot.len();
    let records: Vec<QueryShapeRecord> = snapshot.entries.into_values().collect();

    let results = join_all(records.iter().map(|record| persist_entry(store, record))).await;

    let mut failures = Vec::new();
    for (record, result) in records.iter().zip(results) {
        if let Err(error) = result {
            tracing::warn!(
                ordered_key = %record.ordered_key,
                delta = record.occurrence_count,
                error = %error,
                "Failed to persist query shape count"
            );
            failures.push(ShapeFlushFailure {
                ordered_key: record.ordered_key.clone(),
                delta: record.occurrence_count,
                error,
            });
        }
    }

    let report = FlushReport {
        processed,
        persisted: processed - failures.len(),
        failures,
        elapsed: started.elapsed(),
    };

    tracing::debug!(
        processed = report.processed,
        persisted = report.persisted,
        failed = report.failures.len(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "Flushed query shapes"
    );

    report
}
