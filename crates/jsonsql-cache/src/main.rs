//! jsonsql CLI
//!
//! Command-line tool for transpiling SQL and inspecting the local cache.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use jsonsql_cache::prelude::*;
use jsonsql_core::Transpiler;

/// SQL to JSONSQL transpiler and local cache tool.
#[derive(Parser)]
#[command(name = "jsonsql")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Cache database URL. Overrides the settings file.
    #[arg(short, long, env = "DATABASE_URL")]
    database: Option<String>,

    /// Settings file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Table schemas (JSON array of table definitions).
    #[arg(short, long)]
    schemas: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the JSONSQL request for a SQL statement.
    Transpile {
        /// SQL statement.
        sql: String,
    },

    /// Create the cache bookkeeping tables and the registered tables.
    Init,

    /// Show cache statistics and per-table sync state.
    Stats,

    /// Run a read-only query against a cached table.
    Query {
        /// Registered table whose layout decodes the rows.
        table: String,

        /// SELECT statement.
        sql: String,

        /// Positional parameters, as JSON values.
        #[arg(short, long = "param")]
        params: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = load_settings(&cli)?;
    let registry = Arc::new(match &cli.schemas {
        Some(path) => SchemaRegistry::load_json(path)
            .with_context(|| format!("loading schemas from {}", path.display()))?,
        None => SchemaRegistry::new(),
    });

    match cli.command {
        Commands::Transpile { sql } => {
            let transpiler = Transpiler::with_registry(registry, settings.auto_order_by);
            let request = transpiler.transpile(&sql)?;
            println!("{}", serde_json::to_string_pretty(&request.to_value())?);
        }

        Commands::Init => {
            let store = open_store(&settings).await?;
            for name in registry.list_tables() {
                if let Some(schema) = registry.get(&name) {
                    store.register_table(&schema.effective()).await?;
                }
            }
            info!(
                tables = registry.len(),
                "Cache initialized at {}", settings.database_url
            );
            store.close().await;
        }

        Commands::Stats => {
            let store = open_store(&settings).await?;
            let stats = store.get_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);

            let tables = store.all_sync_metadata().await?;
            if tables.is_empty() {
                info!("No tables have been synced yet.");
            } else {
                println!("\nTables:");
                println!("{:-<72}", "");
                for table in &tables {
                    println!(
                        " {:<24} {:<10} {:>10} rows  {}",
                        table.table_name,
                        table.status.as_str(),
                        table.synced_rows,
                        table
                            .last_sync_at
                            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
                            .unwrap_or_default()
                    );
                }
                println!();
            }
            store.close().await;
        }

        Commands::Query { table, sql, params } => {
            let schema = registry
                .get(&table)
                .with_context(|| format!("table '{table}' is not in the schema file"))?;
            let store = open_store(&settings).await?;
            store.attach_table(&schema.effective()).await?;
            let params = params
                .iter()
                .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw.as_str())))
                .collect::<Vec<Value>>();
            let records = store.execute_query(&table, &sql, &params).await?;
            for record in &records {
                println!("{}", serde_json::to_string(record)?);
            }
            info!(rows = records.len(), "Query finished");
            store.close().await;
        }
    }

    Ok(())
}

fn load_settings(cli: &Cli) -> anyhow::Result<CacheSettings> {
    let mut settings = match &cli.config {
        Some(path) => CacheSettings::load(path)?,
        None => CacheSettings {
            database_url: String::from("sqlite:jsonsql-cache.db"),
            ..CacheSettings::default()
        },
    };
    if let Some(database) = &cli.database {
        settings.database_url.clone_from(database);
    }
    settings.validate()?;
    Ok(settings)
}

/// Connects and creates the bookkeeping tables.
async fn open_store(settings: &CacheSettings) -> anyhow::Result<LocalStore> {
    let store = LocalStore::connect(settings).await?;
    store.initialize().await?;
    Ok(store)
}
