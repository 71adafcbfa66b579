//! MongoDB resource adapter for griddle
//!
//! Generic CRUD over registered resources, with query-shape analytics that
//! count how often each filter/sort combination is used so indexes can be
//! designed from real traffic.
//!
//! # Features
//! - Audit stamping (created-by / modified-by) driven by resource fields
//! - Soft delete with active-status default reads
//! - Search hit hydration in engine order
//! - Buffered shape counters flushed by a background worker

pub mod adapter;
pub mod audit;
pub mod config;
pub mod connection;
pub mod context;
pub mod query;
pub mod registry;
pub mod request;
pub mod resource;
pub mod shape;
pub mod validation;

pub use adapter::{
    check_starts_with_param, new_object_id, DeleteOutcome, FindResult, MongoAdapter,
    UpdateOutcome,
};
pub use audit::{set_created_by, set_modified_by};
pub use config::{GriddleConfig, MongoConfig, ShapeConfig};
pub use connection::{Connection, PoolConfig};
pub use context::GriddleContext;
pub use griddle_common::{GriddleError, Result};
pub use query::FindQuery;
pub use registry::{Model, ResourceRegistry};
pub use request::{Caller, CrudRequest, HydrateRequest};
pub use resource::{FieldType, IndexSpec, ResourceDescriptor};
pub use shape::{
    FlushReport, FrequencyCache, InMemoryShapeStore, MongoShapeStore, QueryShapeRecord,
    ShapeCounterStore, ShapeFlushWorker,
};
pub use validation::{validate_query, ValidatedCollectionName, ValidatedFieldName};
