//! MongoDB connection management with pool configuration and health checking

use bson::{doc, Document as BsonDocument};
use futures::TryStreamExt;
use griddle_common::{GriddleError, Result};
use mongodb::{
    options::{ClientOptions, ServerApi, ServerApiVersion},
    Client, Collection, Database, IndexModel,
};
use std::time::Duration;

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Minimum number of connections in the pool (default: 5)
    pub min_pool_size: Option<u32>,
    /// Maximum number of connections in the pool (default: 20)
    pub max_pool_size: Option<u32>,
    /// Maximum time a connection can remain idle before being closed (default: none)
    pub max_idle_time: Option<Duration>,
    /// Connection timeout (default: 30s)
    pub connect_timeout: Option<Duration>,
    /// Server selection timeout (default: 30s)
    pub server_selection_timeout: Option<Duration>,
    /// Application name for server logs
    pub app_name: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_pool_size: Some(5),
            max_pool_size: Some(20),
            max_idle_time: None,
            connect_timeout: Some(Duration::from_secs(30)),
            server_selection_timeout: Some(Duration::from_secs(30)),
            app_name: Some("griddle".to_string()),
        }
    }
}

/// MongoDB connection manager with pooling support
pub struct Connection {
    client: Client,
    database: Database,
    debug: bool,
}

impl Connection {
    /// Create a new MongoDB connection with default pool settings
    pub async fn new(connection_string: &str) -> Result<Self> {
        Self::with_config(connection_string, PoolConfig::default(), false).await
    }

    /// Create a new MongoDB connection with custom pool configuration.
    ///
    /// With `debug` set, adapters built on this connection log every driver
    /// call at info level.
    pub async fn with_config(
        connection_string: &str,
        config: PoolConfig,
        debug: bool,
    ) -> Result<Self> {
        let mut client_options = ClientOptions::parse(connection_string)
            .await
            .map_err(|e| GriddleError::Connection(format!("Invalid connection string: {}", e)))?;

        if let Some(min) = config.min_pool_size {
            client_options.min_pool_size = Some(min);
        }
        if let Some(max) = config.max_pool_size {
            client_options.max_pool_size = Some(max);
        }
        if let Some(idle) = config.max_idle_time {
            client_options.max_idle_time = Some(idle);
        }
        if let Some(connect) = config.connect_timeout {
            client_options.connect_timeout = Some(connect);
        }
        if let Some(server_sel) = config.server_selection_timeout {
            client_options.server_selection_timeout = Some(server_sel);
        }
        if let Some(app) = config.app_name {
            client_options.app_name = Some(app);
        }

        let server_api = ServerApi::builder().version(ServerApiVersion::V1).build();
        client_options.server_api = Some(server_api);

        let client = Client::with_options(client_options)?;

        let database = client.default_database().ok_or_else(|| {
            GriddleError::Connection(
                "No default database specified in connection string".to_string(),
            )
        })?;

        let debug_mode = debug;
        tracing::info!(database = %database.name(), debug_mode, "MongoDB client configured");

        Ok(Self {
            client,
            database,
            debug,
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn database_name(&self) -> &str {
        self.database.name()
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Whether driver calls should be logged
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Get a collection by name (returns untyped BsonDocument collection)
    pub fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.database.collection(name)
    }

    /// Check if the connection is healthy by pinging the server
    pub async fn ping(&self) -> Result<bool> {
        match self.database.run_command(doc! { "ping": 1 }).await {
            Ok(_) => Ok(true),
            Err(e) => Err(GriddleError::Connection(format!("Ping failed: {}", e))),
        }
    }

    /// List all collection names in the current database
    pub async fn list_collection_names(&self) -> Result<Vec<String>> {
        let names = self.database.list_collection_names().await?;
        Ok(names)
    }

    /// Key documents of every index on a collection
    pub async fn list_index_keys(&self, collection: &str) -> Result<Vec<BsonDocument>> {
        let cursor = self.collection(collection).list_indexes().await?;
        let indexes: Vec<IndexModel> = cursor.try_collect().await?;
        Ok(indexes.into_iter().map(|index| index.keys).collect())
    }

    /// Close every pooled connection
    pub async fn shutdown(self) {
        self.client.shutdown().await;
        tracing::info!(database = %self.database.name(), "MongoDB client shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_config() {
        let config = PoolConfig::default();
        assert_eq!(config.min_pool_size, Some(5));
        assert_eq!(config.max_pool_size, Some(20));
        assert_eq!(config.connect_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.app_name, Some("griddle".to_string()));
    }

    #[tokio::test]
    async fn test_missing_default_database() {
        let result = Connection::new("mongodb://localhost:27017").await;
        assert!(matches!(result, Err(GriddleError::Connection(_))));
    }

    #[tokio::test]
    async fn test_connection_without_server() {
        // the driver connects lazily
        let conn = Connection::with_config(
            "mongodb://localhost:27017/griddle_test",
            PoolConfig::default(),
            true,
        )
        .await
        .unwrap();

        assert_eq!(conn.database_name(), "griddle_test");
        assert!(conn.debug());
        assert_eq!(conn.collection("posts").name(), "posts");
    }

    #[tokio::test]
    async fn test_debug_flag_reaches_the_log_line() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_test_writer()
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let conn = Connection::with_config(
            "mongodb://localhost:27017/griddle_test",
            PoolConfig::default(),
            false,
        )
        .await
        .unwrap();

        assert!(!conn.debug());
    }
}
