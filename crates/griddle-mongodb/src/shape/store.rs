//! Durable stores for query-shape counters
//!
//! The store is the single source of truth for shape counts; the in-memory
//! cache only buffers deltas. Two backends are provided: MongoDB (the
//! `queryShapeCounters` collection) and an in-memory map for tests and
//! embedded use.

use async_trait::async_trait;
use bson::doc;
use dashmap::DashMap;
use futures::TryStreamExt;
use griddle_common::{GriddleError, Result};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::record::{QueryShapeRecord, SHAPE_COLLECTION};

/// Backing store for persisted shape counters
#[async_trait]
pub trait ShapeCounterStore: Send + Sync + 'static {
    /// Create the unique `orderedKey` and non-unique `sortedKey` indexes
    async fn ensure_indexes(&self) -> Result<()>;

    /// Look up a persisted counter by ordered key
    async fn find_one(&self, ordered_key: &str) -> Result<Option<QueryShapeRecord>>;

    /// Atomically add `delta` to an existing counter
    async fn increment(&self, ordered_key: &str, delta: i64) -> Result<()>;

    /// Persist a counter seen for the first time
    async fn insert(&self, record: &QueryShapeRecord) -> Result<()>;

    /// Counters with the highest totals first
    async fn top(&self, limit: usize) -> Result<Vec<QueryShapeRecord>>;
}

/// In-memory counter store (thread-safe, non-distributed)
pub struct InMemoryShapeStore {
    records: Arc<DashMap<String, QueryShapeRecord>>,
    operations: AtomicUsize,
}

impl InMemoryShapeStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            operations: AtomicUsize::new(0),
        }
    }

    /// Number of store calls served so far
    pub fn operations(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Persisted total for a shape
    pub fn count_for(&self, ordered_key: &str) -> Option<i64> {
        self.records.get(ordered_key).map(|r| r.occurrence_count)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn touch(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

impl Default for InMemoryShapeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ShapeCounterStore for InMemoryShapeStore {
    async fn ensure_indexes(&self) -> Result<()> {
        Ok(())
    }

    async fn find_one(&self, ordered_key: &str) -> Result<Option<QueryShapeRecord>> {
        self.touch();
        Ok(self.records.get(ordered_key).map(|r| r.value().clone()))
    }

    async fn increment(&self, ordered_key: &str, delta: i64) -> Result<()> {
        self.touch();
        match self.records.get_mut(ordered_key) {
            Some(mut record) => {
                record.occurrence_count += delta;
                Ok(())
            }
            None => Err(GriddleError::NotFound(format!(
                "No query shape counter for key {}",
                ordered_key
            ))),
        }
    }

    async fn insert(&self, record: &QueryShapeRecord) -> Result<()> {
        self.touch();
        self.records
            .entry(record.ordered_key.clone())
            .and_modify(|existing| existing.occurrence_count += record.occurrence_count)
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn top(&self, limit: usize) -> Result<Vec<QueryShapeRecord>> {
        self.touch();
        let mut records: Vec<QueryShapeRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| {
            b.occurrence_count
                .cmp(&a.occurrence_count)
                .then_with(|| a.ordered_key.cmp(&b.ordered_key))
        });
        records.truncate(limit);
        Ok(records)
    }
}

/// Counter store backed by a MongoDB collection
#[derive(Clone)]
pub struct MongoShapeStore {
    collection: Collection<QueryShapeRecord>,
}

impl MongoShapeStore {
    /// Store using the default `queryShapeCounters` collection
    pub fn new(database: &Database) -> Self {
        Self::with_collection(database, SHAPE_COLLECTION)
    }

    pub fn with_collection(database: &Database, name: &str) -> Self {
        Self {
            collection: database.collection(name),
        }
    }

    pub fn collection_name(&self) -> &str {
        self.collection.name()
    }
}

#[async_trait]
impl ShapeCounterStore for MongoShapeStore {
    async fn ensure_indexes(&self) -> Result<()> {
        let mut unique = IndexOptions::default();
        unique.unique = Some(true);
        unique.name = Some("orderedKey_1".to_string());

        let mut sorted = IndexOptions::default();
        sorted.name = Some("sortedKey_1".to_string());

        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "orderedKey": 1 })
                .options(unique)
                .build(),
            IndexModel::builder()
                .keys(doc! { "sortedKey": 1 })
                .options(sorted)
                .build(),
        ];

        self.collection.create_indexes(indexes).await?;
        Ok(())
    }

    async fn find_one(&self, ordered_key: &str) -> Result<Option<QueryShapeRecord>> {
        let record = self
            .collection
            .find_one(doc! { "orderedKey": ordered_key })
            .await?;
        Ok(record)
    }

    async fn increment(&self, ordered_key: &str, delta: i64) -> Result<()> {
        let result = self
            .collection
            .update_one(
                doc! { "orderedKey": ordered_key },
                doc! { "$inc": { "occurrenceCount": delta } },
            )
            .await?;

        if result.matched_count == 0 {
            return Err(GriddleError::NotFound(format!(
                "No query shape counter for key {}",
                ordered_key
            )));
        }
        Ok(())
    }

    async fn insert(&self, record: &QueryShapeRecord) -> Result<()> {
        match self.collection.insert_one(record).await {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = GriddleError::from(err);
                if !err.is_constraint_violation() {
                    return Err(err);
                }
                // another process inserted the same shape first
                tracing::debug!(
                    ordered_key = %record.ordered_key,
                    "Query shape already persisted, incrementing instead"
                );
                self.increment(&record.ordered_key, record.occurrence_count)
                    .await
            }
        }
    }

    async fn top(&self, limit: usize) -> Result<Vec<QueryShapeRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let cursor = self
            .collection
            .find(doc! {})
            .sort(doc! { "occurrenceCount": -1 })
            .limit(limit)
            .await?;
        let records: Vec<QueryShapeRecord> = cursor.try_collect().await?;
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::canonical::canonicalize;
    use bson::doc;

    fn record(name: &str, field: &str, count: i64) -> QueryShapeRecord {
        let canonical = canonicalize(name, Some(&doc! { field: 1 }), None).unwrap();
        QueryShapeRecord::from_canonical(canonical).with_count(count)
    }

    #[tokio::test]
    async fn test_in_memory_insert_and_increment() {
        let store = InMemoryShapeStore::new();
        let rec = record("posts", "status", 3);

        store.insert(&rec).await.unwrap();
        store.increment(&rec.ordered_key, 4).await.unwrap();

        assert_eq!(store.count_for(&rec.ordered_key), Some(7));
        assert_eq!(store.operations(), 2);
    }

    #[tokio::test]
    async fn test_in_memory_increment_missing() {
        let store = InMemoryShapeStore::new();
        let result = store.increment("missing", 1).await;
        assert!(matches!(result, Err(GriddleError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_in_memory_top_orders_by_count() {
        let store = InMemoryShapeStore::new();
        store.insert(&record("posts", "a", 1)).await.unwrap();
        store.insert(&record("posts", "b", 10)).await.unwrap();
        store.insert(&record("posts", "c", 5)).await.unwrap();

        let top = store.top(2).await.unwrap();
        let counts: Vec<i64> = top.iter().map(|r| r.occurrence_count).collect();
        assert_eq!(counts, vec![10, 5]);
    }
}
