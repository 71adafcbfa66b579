//! Griddle CLI - operator tooling
//!
//! Usage:
//!   griddle ping                      Connect and ping the database
//!   griddle shapes top [--limit N]    Most frequent persisted query shapes
//!   griddle shapes top --json         Raw counter records as JSON
//!   griddle shapes indexes            Index suggestions not yet covered
//!
//! Configuration comes from GRIDDLE_* environment variables, or from
//! `--config <file>` (TOML). `--url` overrides both.

use anyhow::{Context, Result};
use bson::Document as BsonDocument;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;

use griddle_mongodb::shape::{is_covered, summarize, ShapeSummary};
use griddle_mongodb::{Connection, GriddleConfig, MongoShapeStore, ShapeCounterStore};

#[derive(Parser)]
#[command(name = "griddle")]
#[command(about = "Griddle operator CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// MongoDB connection string (must name a database)
    #[arg(long, global = true)]
    url: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and ping the database
    Ping,
    /// Query-shape analytics
    Shapes {
        #[command(subcommand)]
        action: ShapesAction,
    },
}

#[derive(Subcommand)]
enum ShapesAction {
    /// Print the most frequent query shapes
    Top {
        /// Number of counter records to read
        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        /// Print raw records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Suggest indexes for frequent shapes not covered by an existing index
    Indexes {
        /// Number of counter records to read
        #[arg(short, long, default_value_t = 50)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = load_config(cli.config.as_ref(), cli.url)?;

    let rt = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    rt.block_on(async {
        match cli.command {
            Commands::Ping => run_ping(&config).await,
            Commands::Shapes { action } => match action {
                ShapesAction::Top { limit, json } => run_shapes_top(&config, limit, json).await,
                ShapesAction::Indexes { limit } => run_shapes_indexes(&config, limit).await,
            },
        }
    })
}

fn init_tracing(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .ok();
}

fn load_config(path: Option<&PathBuf>, url: Option<String>) -> Result<GriddleConfig> {
    let mut config = match path {
        Some(path) => GriddleConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => GriddleConfig::from_env().context("Invalid GRIDDLE_* environment")?,
    };

    if let Some(url) = url {
        config.mongo.url = url;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn connect(config: &GriddleConfig) -> Result<Connection> {
    Connection::with_config(
        &config.mongo.url,
        config.mongo.pool_config(),
        config.mongo.debug,
    )
    .await
    .context("Failed to configure MongoDB client")
}

async fn run_ping(config: &GriddleConfig) -> Result<()> {
    let conn = connect(config).await?;
    conn.ping().await.context("Ping failed")?;
    let collections = conn.list_collection_names().await?;

    println!(
        "ok: database '{}' ({} collections)",
        conn.database_name(),
        collections.len()
    );
    conn.shutdown().await;
    Ok(())
}

async fn run_shapes_top(config: &GriddleConfig, limit: usize, json: bool) -> Result<()> {
    let conn = connect(config).await?;
    let store = MongoShapeStore::with_collection(conn.database(), &config.shapes.collection);
    let records = store
        .top(limit)
        .await
        .context("Failed to read query shape counters")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        conn.shutdown().await;
        return Ok(());
    }

    if records.is_empty() {
        println!("No query shapes recorded in '{}'", store.collection_name());
        conn.shutdown().await;
        return Ok(());
    }

    println!("{:>10}  {:>8}  {:<20}  {}", "COUNT", "VARIANTS", "RESOURCE", "SHAPE");
    for summary in summarize(&records) {
        println!(
            "{:>10}  {:>8}  {:<20}  {}",
            summary.total_count,
            summary.variants,
            summary.name,
            describe(&summary)
        );
    }

    conn.shutdown().await;
    Ok(())
}

async fn run_shapes_indexes(config: &GriddleConfig, limit: usize) -> Result<()> {
    let conn = connect(config).await?;
    let store = MongoShapeStore::with_collection(conn.database(), &config.shapes.collection);
    let records = store
        .top(limit)
        .await
        .context("Failed to read query shape counters")?;

    let mut existing: HashMap<String, Vec<BsonDocument>> = HashMap::new();
    let mut suggested = 0;

    for summary in summarize(&records) {
        let keys = summary.suggested_index();
        if keys.is_empty() {
            continue;
        }

        if !existing.contains_key(&summary.name) {
            let indexes = conn
                .list_index_keys(&summary.name)
                .await
                .with_context(|| format!("Failed to list indexes on {}", summary.name))?;
            existing.insert(summary.name.clone(), indexes);
        }
        let indexes = existing.entry(summary.name.clone()).or_default();
        if is_covered(&keys, indexes) {
            continue;
        }

        println!(
            "db.{}.createIndex({})  // {} queries",
            summary.name, keys, summary.total_count
        );
        // later, less frequent shapes with the same prefix are now covered
        indexes.push(keys);
        suggested += 1;
    }

    if suggested == 0 {
        println!("Every recorded shape is covered by an existing index");
    }

    conn.shutdown().await;
    Ok(())
}

fn describe(summary: &ShapeSummary) -> String {
    let sort: Vec<String> = summary
        .sort_fields
        .iter()
        .map(|s| format!("{}:{}", s.field, s.direction))
        .collect();

    if sort.is_empty() {
        format!("where [{}]", summary.fields.join(", "))
    } else {
        format!(
            "where [{}] sort [{}]",
            summary.fields.join(", "),
            sort.join(", ")
        )
    }
}
