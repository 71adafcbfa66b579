//! In-memory query-shape frequency cache
//!
//! Counts accumulate here between flushes. The cache is mutated through two
//! atomic operations only: get-or-create-then-increment ([`FrequencyCache::record`])
//! and swap-for-empty ([`FrequencyCache::take_snapshot`]). Neither holds the
//! lock across an await point.

use bson::Document as BsonDocument;
use griddle_common::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use super::canonical::{canonicalize, is_identifier_lookup};
use super::record::QueryShapeRecord;

/// Default time between flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);

/// Result of a single `record` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Filter addressed a document by identifier; nothing recorded
    SkippedIdentifierLookup,
    /// Shape counted
    Recorded {
        ordered_key: String,
        /// In-memory count after this call
        count: i64,
        /// The flush interval had elapsed and the flush worker was signalled
        flush_due: bool,
    },
}

/// Accumulated shapes taken out of the cache by a flush
#[derive(Debug, Default)]
pub struct ShapeSnapshot {
    pub entries: HashMap<String, QueryShapeRecord>,
}

impl ShapeSnapshot {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counts in the snapshot
    pub fn total_count(&self) -> i64 {
        self.entries.values().map(|r| r.occurrence_count).sum()
    }
}

/// Write buffer of query-shape counts, shared by all adapters of a context
pub struct FrequencyCache {
    entries: Mutex<HashMap<String, QueryShapeRecord>>,
    last_flush: Mutex<Instant>,
    flush_interval: Duration,
    flush_signal: Arc<Notify>,
}

impl FrequencyCache {
    /// Create a cache with the default 60 second flush interval
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_FLUSH_INTERVAL)
    }

    /// Create a cache with a custom flush interval
    pub fn with_interval(flush_interval: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            last_flush: Mutex::new(Instant::now()),
            flush_interval,
            flush_signal: Arc::new(Notify::new()),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Notifier the flush worker listens on for early flushes
    pub fn flush_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.flush_signal)
    }

    /// Count one occurrence of the query's shape.
    ///
    /// Identifier lookups are skipped. Errors (empty name, bad sort value)
    /// leave the cache untouched.
    pub fn record(
        &self,
        name: &str,
        filter: Option<&BsonDocument>,
        sort: Option<&BsonDocument>,
    ) -> Result<RecordOutcome> {
        if is_identifier_lookup(filter) {
            return Ok(RecordOutcome::SkippedIdentifierLookup);
        }

        let canonical = canonicalize(name, filter, sort)?;
        let ordered_key = canonical.ordered_key.clone();

        let count = {
            let mut entries = self.entries.lock();
            let record = entries
                .entry(ordered_key.clone())
                .or_insert_with(|| QueryShapeRecord::from_canonical(canonical));
            record.occurrence_count += 1;
            record.occurrence_count
        };

        let flush_due = self.last_flush.lock().elapsed() > self.flush_interval;
        if flush_due {
            self.flush_signal.notify_one();
        }

        Ok(RecordOutcome::Recorded {
            ordered_key,
            count,
            flush_due,
        })
    }

    /// Swap the live map for an empty one and hand back what it held.
    ///
    /// Records arriving after the swap land in the fresh map.
    pub fn take_snapshot(&self) -> ShapeSnapshot {
        let entries = std::mem::take(&mut *self.entries.lock());
        *self.last_flush.lock() = Instant::now();
        ShapeSnapshot { entries }
    }

    /// Drop every accumulated count
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// In-memory count for a shape, 0 if absent
    pub fn count_for(&self, ordered_key: &str) -> i64 {
        self.entries
            .lock()
            .get(ordered_key)
            .map(|r| r.occurrence_count)
            .unwrap_or(0)
    }

    /// Copy of the current counts, keyed by ordered key
    pub fn snapshot_counts(&self) -> HashMap<String, i64> {
        self.entries
            .lock()
            .iter()
            .map(|(k, r)| (k.clone(), r.occurrence_count))
            .collect()
    }

    /// Time since the last flush
    pub fn since_last_flush(&self) -> Duration {
        self.last_flush.lock().elapsed()
    }
}

impl Default for FrequencyCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FrequencyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyCache")
            .field("shapes", &self.len())
            .field("flush_interval", &self.flush_interval)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use griddle_common::GriddleError;
    use std::thread;

    fn recorded_key(outcome: RecordOutcome) -> String {
        match outcome {
            RecordOutcome::Recorded { ordered_key, .. } => ordered_key,
            other => panic!("expected a recorded shape, got {:?}", other),
        }
    }

    #[test]
    fn test_identifier_lookup_not_recorded() {
        let cache = FrequencyCache::new();
        let outcome = cache.record("widgets", Some(&doc! { "id": "123" }), Some(&doc! {})).unwrap();

        assert_eq!(outcome, RecordOutcome::SkippedIdentifierLookup);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_same_shape_accumulates() {
        let cache = FrequencyCache::new();
        let filter = doc! { "status": "created", "authorId": 9 };

        let mut key = String::new();
        for _ in 0..25 {
            key = recorded_key(cache.record("posts", Some(&filter), None).unwrap());
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.count_for(&key), 25);
    }

    #[test]
    fn test_values_collapse_into_one_entry() {
        let cache = FrequencyCache::new();
        let sort = doc! { "createDate": -1 };

        let first = recorded_key(cache.record("posts", Some(&doc! { "status": "x" }), Some(&sort)).unwrap());
        let second = recorded_key(cache.record("posts", Some(&doc! { "status": "y" }), Some(&sort)).unwrap());

        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.count_for(&first), 2);
    }

    #[test]
    fn test_field_order_gives_distinct_entries() {
        let cache = FrequencyCache::new();
        cache.record("widgets", Some(&doc! { "a": 1, "b": 1 }), None).unwrap();
        cache.record("widgets", Some(&doc! { "b": 1, "a": 1 }), None).unwrap();

        let snapshot = cache.take_snapshot();
        assert_eq!(snapshot.len(), 2);

        let sorted_keys: Vec<&String> = snapshot.entries.values().map(|r| &r.sorted_key).collect();
        assert_eq!(sorted_keys[0], sorted_keys[1]);
    }

    #[test]
    fn test_text_score_sort_is_recorded() {
        let cache = FrequencyCache::new();
        let filter = doc! { "$text": { "$search": "rust" } };
        let sort = doc! { "score": { "$meta": "textScore" } };

        let key = recorded_key(cache.record("posts", Some(&filter), Some(&sort)).unwrap());
        cache.record("posts", Some(&filter), Some(&sort)).unwrap();

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.count_for(&key), 2);
        assert!(key.contains(r#""sort":{"score":{"$meta":"textScore"}}"#));
    }

    #[test]
    fn test_missing_name_leaves_cache_untouched() {
        let cache = FrequencyCache::new();
        cache.record("posts", Some(&doc! { "status": 1 }), None).unwrap();

        let result = cache.record("", Some(&doc! { "status": 1 }), None);
        assert!(matches!(result, Err(GriddleError::Configuration(_))));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_take_snapshot_empties_cache() {
        let cache = FrequencyCache::new();
        cache.record("posts", Some(&doc! { "status": 1 }), None).unwrap();
        cache.record("posts", Some(&doc! { "status": 1 }), None).unwrap();

        let snapshot = cache.take_snapshot();
        assert_eq!(snapshot.total_count(), 2);
        assert!(cache.is_empty());

        let key = recorded_key(cache.record("posts", Some(&doc! { "status": 1 }), None).unwrap());
        assert_eq!(cache.count_for(&key), 1);
    }

    #[test]
    fn test_clear() {
        let cache = FrequencyCache::new();
        cache.record("posts", Some(&doc! { "status": 1 }), None).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_flush_due_after_interval() {
        let cache = FrequencyCache::with_interval(Duration::ZERO);
        thread::sleep(Duration::from_millis(2));

        let outcome = cache.record("posts", Some(&doc! { "status": 1 }), None).unwrap();
        assert!(matches!(outcome, RecordOutcome::Recorded { flush_due: true, .. }));

        let cache = FrequencyCache::with_interval(Duration::from_secs(3600));
        let outcome = cache.record("posts", Some(&doc! { "status": 1 }), None).unwrap();
        assert!(matches!(outcome, RecordOutcome::Recorded { flush_due: false, .. }));
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let cache = Arc::new(FrequencyCache::new());
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for _ in 0..500 {
                        cache.record("posts", Some(&doc! { "status": 1 }), None).unwrap();
                    }
                })
            })
            .collect();

        for handle in threads {
            handle.join().unwrap();
        }

        assert_eq!(cache.snapshot_counts().values().sum::<i64>(), 4000);
    }

    #[test]
    fn test_snapshot_racing_records_neither_loses_nor_duplicates() {
        let cache = Arc::new(FrequencyCache::new());
        let writers: Vec<_> = (0..4)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || {
                    for n in 0..1000 {
                        // alternate between a shared shape and per-thread new shapes
                        let filter = if n % 2 == 0 {
                            doc! { "status": 1 }
                        } else {
                            let mut filter = BsonDocument::new();
                            filter.insert(format!("field_{}_{}", i, n % 7), 1);
                            filter
                        };
                        cache.record("posts", Some(&filter), None).unwrap();
                    }
                })
            })
            .collect();

        let mut flushed = 0_i64;
        for _ in 0..50 {
            flushed += cache.take_snapshot().total_count();
            thread::yield_now();
        }

        for handle in writers {
            handle.join().unwrap();
        }
        flushed += cache.take_snapshot().total_count();

        assert_eq!(flushed, 4000);
    }
}
