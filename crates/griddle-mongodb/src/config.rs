//! Runtime configuration.
//!
//! # Example
//! ```rust,ignore
//! use griddle_mongodb::GriddleConfig;
//!
//! // From environment
//! let config = GriddleConfig::from_env()?;
//!
//! // Or from a TOML file
//! let config = GriddleConfig::from_file("griddle.toml")?;
//! ```

use griddle_common::{GriddleError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::connection::PoolConfig;
use crate::shape::SHAPE_COLLECTION;

pub const DEFAULT_MONGO_URL: &str = "mongodb://localhost:27017/griddle";

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GriddleConfig {
    pub mongo: MongoConfig,
    pub shapes: ShapeConfig,
}

/// Database connection settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MongoConfig {
    /// Connection string; must name a default database
    pub url: String,
    /// Log every driver call
    pub debug: bool,
    pub app_name: String,
    pub min_pool_size: u32,
    pub max_pool_size: u32,
    pub connect_timeout_secs: u64,
    pub server_selection_timeout_secs: u64,
    pub max_idle_secs: Option<u64>,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_MONGO_URL.to_string(),
            debug: false,
            app_name: "griddle".to_string(),
            min_pool_size: 5,
            max_pool_size: 20,
            connect_timeout_secs: 30,
            server_selection_timeout_secs: 30,
            max_idle_secs: None,
        }
    }
}

impl MongoConfig {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            min_pool_size: Some(self.min_pool_size),
            max_pool_size: Some(self.max_pool_size),
            max_idle_time: self.max_idle_secs.map(Duration::from_secs),
            connect_timeout: Some(Duration::from_secs(self.connect_timeout_secs)),
            server_selection_timeout: Some(Duration::from_secs(self.server_selection_timeout_secs)),
            app_name: Some(self.app_name.clone()),
        }
    }
}

/// Query-shape analytics settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShapeConfig {
    pub enabled: bool,
    pub flush_interval_secs: u64,
    /// Counter collection name
    pub collection: String,
}

impl Default for ShapeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            flush_interval_secs: 60,
            collection: SHAPE_COLLECTION.to_string(),
        }
    }
}

impl ShapeConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

impl GriddleConfig {
    /// Build configuration from environment variables.
    ///
    /// Reads `GRIDDLE_MONGO_URL`, `GRIDDLE_MONGO_DEBUG`,
    /// `GRIDDLE_SHAPES_ENABLED` and `GRIDDLE_SHAPES_FLUSH_SECS`; anything
    /// unset keeps its default.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup("GRIDDLE_MONGO_URL") {
            config.mongo.url = url;
        }
        if let Some(debug) = lookup("GRIDDLE_MONGO_DEBUG") {
            config.mongo.debug = parse_bool("GRIDDLE_MONGO_DEBUG", &debug)?;
        }
        if let Some(enabled) = lookup("GRIDDLE_SHAPES_ENABLED") {
            config.shapes.enabled = parse_bool("GRIDDLE_SHAPES_ENABLED", &enabled)?;
        }
        if let Some(secs) = lookup("GRIDDLE_SHAPES_FLUSH_SECS") {
            config.shapes.flush_interval_secs = secs.trim().parse().map_err(|_| {
                GriddleError::Configuration(format!(
                    "GRIDDLE_SHAPES_FLUSH_SECS must be a whole number of seconds, got '{}'",
                    secs
                ))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|e| GriddleError::Configuration(format!("Invalid TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let input = std::fs::read_to_string(path).map_err(|e| {
            GriddleError::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mongo.url.trim().is_empty() {
            return Err(GriddleError::Configuration(
                "mongo.url cannot be empty".to_string(),
            ));
        }
        if self.shapes.flush_interval_secs == 0 {
            return Err(GriddleError::Configuration(
                "shapes.flush_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.shapes.collection.is_empty() {
            return Err(GriddleError::Configuration(
                "shapes.collection cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(GriddleError::Configuration(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = GriddleConfig::default();
        assert_eq!(config.mongo.url, DEFAULT_MONGO_URL);
        assert!(!config.mongo.debug);
        assert!(config.shapes.enabled);
        assert_eq!(config.shapes.flush_interval(), Duration::from_secs(60));
        assert_eq!(config.shapes.collection, "queryShapeCounters");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_lookup() {
        let config = GriddleConfig::from_lookup(lookup(&[
            ("GRIDDLE_MONGO_URL", "mongodb://db:27017/app"),
            ("GRIDDLE_MONGO_DEBUG", "true"),
            ("GRIDDLE_SHAPES_ENABLED", "0"),
            ("GRIDDLE_SHAPES_FLUSH_SECS", "15"),
        ]))
        .unwrap();

        assert_eq!(config.mongo.url, "mongodb://db:27017/app");
        assert!(config.mongo.debug);
        assert!(!config.shapes.enabled);
        assert_eq!(config.shapes.flush_interval_secs, 15);
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        assert!(GriddleConfig::from_lookup(lookup(&[("GRIDDLE_MONGO_DEBUG", "maybe")])).is_err());
        assert!(GriddleConfig::from_lookup(lookup(&[("GRIDDLE_SHAPES_FLUSH_SECS", "soon")])).is_err());
        assert!(matches!(
            GriddleConfig::from_lookup(lookup(&[("GRIDDLE_SHAPES_FLUSH_SECS", "0")])),
            Err(GriddleError::Configuration(_))
        ));
    }

    #[test]
    fn test_from_toml_str() {
        let config = GriddleConfig::from_toml_str(
            r#"
            [mongo]
            url = "mongodb://db:27017/app"
            max_pool_size = 50

            [shapes]
            flush_interval_secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.mongo.url, "mongodb://db:27017/app");
        assert_eq!(config.mongo.min_pool_size, 5);
        assert_eq!(config.mongo.pool_config().max_pool_size, Some(50));
        assert!(config.shapes.enabled);
        assert_eq!(config.shapes.flush_interval_secs, 5);
    }

    #[test]
    fn test_validate() {
        let mut config = GriddleConfig::default();
        config.mongo.url = "  ".to_string();
        assert!(matches!(config.validate(), Err(GriddleError::Configuration(_))));

        assert!(GriddleConfig::from_toml_str("[shapes]\nflush_interval_secs = 0").is_err());
        assert!(GriddleConfig::from_toml_str("[mongo]\nurl = 5").is_err());
    }
}
