//! Query-shape analytics
//!
//! Tracks how often each distinct (filter fields, sort) combination is
//! queried per resource, to inform index design. Counts are buffered in a
//! [`FrequencyCache`], drained by [`flush`] into a [`ShapeCounterStore`],
//! and the cadence is owned by a [`ShapeFlushWorker`].

pub mod cache;
pub mod canonical;
pub mod flush;
pub mod record;
pub mod report;
pub mod store;
pub mod worker;

pub use cache::{FrequencyCache, RecordOutcome, ShapeSnapshot, DEFAULT_FLUSH_INTERVAL};
pub use canonical::{
    canonicalize, is_identifier_lookup, CanonicalShape, QueryShape, SortDirection, SortField,
    IDENTIFIER_FIELDS,
};
pub use flush::{flush, FlushReport, ShapeFlushFailure};
pub use record::{QueryShapeRecord, SHAPE_COLLECTION};
pub use report::{is_covered, summarize, ShapeSummary};
pub use store::{InMemoryShapeStore, MongoShapeStore, ShapeCounterStore};
pub use worker::ShapeFlushWorker;
