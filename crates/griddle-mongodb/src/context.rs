//! Composition root
//!
//! Owns the connection, resource registry, shape cache and flush worker,
//! and hands out adapters wired to them.

use griddle_common::Result;
use std::sync::Arc;

use crate::adapter::MongoAdapter;
use crate::config::GriddleConfig;
use crate::connection::Connection;
use crate::registry::ResourceRegistry;
use crate::resource::ResourceDescriptor;
use crate::shape::{
    flush, FlushReport, FrequencyCache, MongoShapeStore, ShapeCounterStore, ShapeFlushWorker,
};

pub struct GriddleContext {
    config: GriddleConfig,
    connection: Connection,
    registry: ResourceRegistry,
    shapes: Arc<FrequencyCache>,
    store: Arc<MongoShapeStore>,
    worker: Option<ShapeFlushWorker>,
}

impl GriddleContext {
    /// Connect and start shape analytics when enabled
    pub async fn init(config: GriddleConfig) -> Result<Self> {
        config.validate()?;

        let connection = Connection::with_config(
            &config.mongo.url,
            config.mongo.pool_config(),
            config.mongo.debug,
        )
        .await?;
        let database = connection.database().clone();

        let registry = ResourceRegistry::new(database.clone());
        let shapes = Arc::new(FrequencyCache::with_interval(config.shapes.flush_interval()));
        let store = Arc::new(MongoShapeStore::with_collection(
            &database,
            &config.shapes.collection,
        ));

        let worker = if config.shapes.enabled {
            store.ensure_indexes().await?;
            let dyn_store: Arc<dyn ShapeCounterStore> = store.clone();
            Some(ShapeFlushWorker::spawn(Arc::clone(&shapes), dyn_store))
        } else {
            None
        };

        tracing::info!(
            database = %connection.database_name(),
            shapes = config.shapes.enabled,
            "Griddle context initialized"
        );

        Ok(Self {
            config,
            connection,
            registry,
            shapes,
            store,
            worker,
        })
    }

    /// Adapter for a resource, registering it on first use
    pub async fn adapter(&self, descriptor: &ResourceDescriptor) -> Result<MongoAdapter> {
        let model = self.registry.get_model(descriptor).await?;
        let mut adapter = MongoAdapter::new(model, self.connection.database().clone())
            .with_debug(self.connection.debug());
        if self.config.shapes.enabled {
            adapter = adapter.with_shapes(Arc::clone(&self.shapes));
        }
        Ok(adapter)
    }

    pub fn config(&self) -> &GriddleConfig {
        &self.config
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    pub fn shapes(&self) -> &Arc<FrequencyCache> {
        &self.shapes
    }

    pub fn shape_store(&self) -> &MongoShapeStore {
        &self.store
    }

    /// Persist buffered shape counts without waiting for the worker
    pub async fn flush_shapes(&self) -> FlushReport {
        flush(&self.shapes, self.store.as_ref()).await
    }

    /// Stop the worker after its final flush, then disconnect
    pub async fn shutdown(self) {
        if let Some(worker) = self.worker {
            worker.shutdown().await;
        }
        self.connection.shutdown().await;
    }
}
