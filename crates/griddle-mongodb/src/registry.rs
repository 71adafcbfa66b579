//! Registered resources, one model per collection name

use bson::Document as BsonDocument;
use griddle_common::Result;
use mongodb::{Collection, Database};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::resource::ResourceDescriptor;

/// A resource bound to its collection
#[derive(Debug)]
pub struct Model {
    descriptor: ResourceDescriptor,
    collection: Collection<BsonDocument>,
}

impl Model {
    pub fn new(descriptor: ResourceDescriptor, database: &Database) -> Self {
        let collection = database.collection(descriptor.name());
        Self {
            descriptor,
            collection,
        }
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    pub fn collection(&self) -> &Collection<BsonDocument> {
        &self.collection
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }
}

/// Cache of registered models keyed by resource name.
///
/// The first registration of a name creates its declared indexes; later
/// lookups return the cached model unchanged.
pub struct ResourceRegistry {
    database: Database,
    models: RwLock<HashMap<String, Arc<Model>>>,
}

impl ResourceRegistry {
    pub fn new(database: Database) -> Self {
        Self {
            database,
            models: RwLock::new(HashMap::new()),
        }
    }

    /// Get the model for a resource, registering it on first use
    pub async fn get_model(&self, descriptor: &ResourceDescriptor) -> Result<Arc<Model>> {
        let cached = self.models.read().get(descriptor.name()).cloned();
        if let Some(model) = cached {
            return Ok(model);
        }

        let model = Model::new(descriptor.clone(), &self.database);

        if !descriptor.indexes().is_empty() {
            let indexes: Vec<_> = descriptor
                .indexes()
                .iter()
                .map(|spec| spec.to_index_model())
                .collect();
            model.collection().create_indexes(indexes).await?;
        }

        tracing::debug!(
            resource = %descriptor.name(),
            indexes = descriptor.indexes().len(),
            "Registered resource"
        );

        let mut models = self.models.write();
        let model = models
            .entry(descriptor.name().to_string())
            .or_insert_with(|| Arc::new(model))
            .clone();
        Ok(model)
    }

    /// Cached model, if the resource has been registered
    pub fn get(&self, name: &str) -> Option<Arc<Model>> {
        self.models.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.models.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.read().is_empty()
    }

    /// Forget every registered model
    pub fn clear_cache(&self) {
        self.models.write().clear();
    }

    pub fn database(&self) -> &Database {
        &self.database
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::FieldType;
    use mongodb::Client;

    // building a client does not contact the server
    async fn offline_database() -> Database {
        let client = Client::with_uri_str("mongodb://localhost:27017/griddle_test")
            .await
            .unwrap();
        client.database("griddle_test")
    }

    #[tokio::test]
    async fn test_get_model_caches_by_name() {
        let registry = ResourceRegistry::new(offline_database().await);
        let descriptor = ResourceDescriptor::new(
            "posts",
            vec![("status".to_string(), FieldType::String)],
            vec![],
        )
        .unwrap();

        let first = registry.get_model(&descriptor).await.unwrap();
        let second = registry.get_model(&descriptor).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.collection().name(), "posts");
        assert!(first.descriptor().has_status());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_cache() {
        let registry = ResourceRegistry::new(offline_database().await);
        registry
            .get_model(&ResourceDescriptor::bare("posts").unwrap())
            .await
            .unwrap();
        assert!(registry.contains("posts"));

        registry.clear_cache();
        assert!(registry.is_empty());
        assert!(registry.get("posts").is_none());
    }
}
