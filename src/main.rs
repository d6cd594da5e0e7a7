//! Binary entry point for nsrecall.
//!
//! Wires the library from configuration and exposes the store and the
//! retriever as subcommands.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use nsrecall::config::NsrecallConfig;
use nsrecall::observability::{self, ObservabilityConfig};
use nsrecall::services::BackendFactory;
use nsrecall::storage::DEFAULT_LIST_LIMIT;
use nsrecall::{Payload, SearchResult, SearchStrategy, VectorStore};
use serde_json::Value;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::runtime::Handle;

/// nsrecall - namespace-partitioned vector store with multi-namespace retrieval.
#[derive(Parser)]
#[command(name = "nsrecall")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Store a record.
    Put {
        /// Namespace.
        namespace: String,

        /// Record key.
        key: String,

        /// Record content.
        content: String,

        /// Extra payload fields as key=value (values parsed as JSON when possible).
        #[arg(short, long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
    },

    /// Print a record's payload.
    Get {
        /// Namespace.
        namespace: String,

        /// Record key.
        key: String,
    },

    /// Delete a record.
    Delete {
        /// Namespace.
        namespace: String,

        /// Record key.
        key: String,
    },

    /// List records in a namespace.
    List {
        /// Namespace.
        namespace: String,

        /// Maximum number of records.
        #[arg(short, long, default_value_t = DEFAULT_LIST_LIMIT)]
        limit: usize,
    },

    /// Similarity search within one namespace.
    Search {
        /// Namespace.
        namespace: String,

        /// Query text.
        query: String,

        /// Maximum number of results.
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Multi-namespace retrieval.
    Retrieve {
        /// Query text.
        query: String,

        /// Strategy: primary_only, fallback, or comprehensive.
        #[arg(short, long, default_value = "fallback")]
        strategy: String,

        /// Primary namespace (defaults to the configured default namespace).
        #[arg(short, long)]
        primary: Option<String>,

        /// Maximum number of results (per namespace for comprehensive).
        #[arg(short, long, default_value = "12")]
        limit: usize,

        /// Fallback score threshold.
        #[arg(long)]
        fallback_threshold: Option<f32>,

        /// Fallback minimum primary result count.
        #[arg(long)]
        min_primary: Option<usize>,
    },

    /// Show status.
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config.with_env_overrides(),
        Err(e) => {
            eprintln!("Failed to load configuration: {e:#}");
            return ExitCode::FAILURE;
        },
    };

    let observability_config =
        ObservabilityConfig::from_settings(&config.observability, cli.verbose);
    let _observability = match observability::init(&observability_config) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Failed to initialize observability: {e}");
            return ExitCode::FAILURE;
        },
    };

    // The store and engines block; keep them off the async workers.
    let runtime = Handle::current();
    let result =
        tokio::task::spawn_blocking(move || run_command(cli.command, &config, &runtime)).await;

    match result {
        Ok(Ok(code)) => code,
        Ok(Err(e)) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        },
        Err(e) => {
            eprintln!("Error: command task failed: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Loads configuration from `--config`, `NSRECALL_CONFIG_PATH`, or the default location.
fn load_config(path: Option<&str>) -> anyhow::Result<NsrecallConfig> {
    if let Some(config_path) = path {
        return NsrecallConfig::load_from_file(std::path::Path::new(config_path))
            .with_context(|| format!("loading {config_path}"));
    }

    if let Ok(config_path) = std::env::var("NSRECALL_CONFIG_PATH")
        && !config_path.trim().is_empty()
    {
        return NsrecallConfig::load_from_file(std::path::Path::new(&config_path))
            .with_context(|| format!("loading {config_path}"));
    }

    Ok(NsrecallConfig::load_default())
}

/// Runs the selected command on a blocking thread.
fn run_command(
    command: Commands,
    config: &NsrecallConfig,
    runtime: &Handle,
) -> anyhow::Result<ExitCode> {
    let store = BackendFactory::create_store(config).context("opening vector store")?;

    match command {
        Commands::Put {
            namespace,
            key,
            content,
            meta,
        } => cmd_put(&store, &namespace, &key, content, &meta),

        Commands::Get { namespace, key } => cmd_get(&store, &namespace, &key),

        Commands::Delete { namespace, key } => {
            store.delete(&namespace, &key)?;
            println!("Deleted {namespace}/{key}");
            Ok(ExitCode::SUCCESS)
        },

        Commands::List { namespace, limit } => cmd_list(&store, &namespace, limit),

        Commands::Search {
            namespace,
            query,
            limit,
        } => {
            for (key, payload, score) in store.search(&namespace, &query, limit) {
                print_result(&SearchResult::new(key, payload, score, namespace.as_str()));
            }
            Ok(ExitCode::SUCCESS)
        },

        Commands::Retrieve {
            query,
            strategy,
            primary,
            limit,
            fallback_threshold,
            min_primary,
        } => cmd_retrieve(
            store,
            config,
            runtime,
            &RetrieveArgs {
                query,
                strategy: strategy.parse()?,
                primary,
                limit,
                fallback_threshold,
                min_primary,
            },
        ),

        Commands::Status => cmd_status(&store, config),
    }
}

fn cmd_put(
    store: &VectorStore,
    namespace: &str,
    key: &str,
    content: String,
    meta: &[String],
) -> anyhow::Result<ExitCode> {
    let mut payload = Payload::new(content);
    for entry in meta {
        let Some((field, raw)) = entry.split_once('=') else {
            bail!("invalid --meta '{entry}', expected KEY=VALUE");
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
        payload = payload.with_field(field.trim(), value);
    }

    store.put(namespace, key, payload)?;
    println!("Stored {namespace}/{key}");
    Ok(ExitCode::SUCCESS)
}

fn cmd_get(store: &VectorStore, namespace: &str, key: &str) -> anyhow::Result<ExitCode> {
    let Some(payload) = store.get(namespace, key) else {
        eprintln!("Not found: {namespace}/{key}");
        return Ok(ExitCode::FAILURE);
    };
    println!("{}", serde_json::to_string_pretty(&payload.to_json()?)?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_list(store: &VectorStore, namespace: &str, limit: usize) -> anyhow::Result<ExitCode> {
    let records = store.list(namespace, limit);
    for (key, payload) in &records {
        println!("{key}\t{}", payload.content);
    }
    println!("{} record(s)", records.len());
    Ok(ExitCode::SUCCESS)
}

struct RetrieveArgs {
    query: String,
    strategy: SearchStrategy,
    primary: Option<String>,
    limit: usize,
    fallback_threshold: Option<f32>,
    min_primary: Option<usize>,
}

fn cmd_retrieve(
    store: Arc<VectorStore>,
    config: &NsrecallConfig,
    runtime: &Handle,
    args: &RetrieveArgs,
) -> anyhow::Result<ExitCode> {
    let retriever = BackendFactory::create_retriever(store, config)?;
    let primary = args
        .primary
        .clone()
        .unwrap_or_else(|| retriever.config().default_namespace.clone());

    let results = runtime.block_on(async {
        match args.strategy {
            SearchStrategy::PrimaryOnly => {
                retriever
                    .search_primary_only(&args.query, &primary, args.limit)
                    .await
            },
            SearchStrategy::Fallback => {
                retriever
                    .search_with_fallback(
                        &args.query,
                        &primary,
                        args.limit,
                        args.fallback_threshold
                            .unwrap_or(retriever.config().fallback_threshold),
                        args.min_primary
                            .unwrap_or(retriever.config().min_primary_results),
                    )
                    .await
            },
            SearchStrategy::Comprehensive => {
                retriever.search_all_namespaces(&args.query, args.limit).await
            },
        }
    })?;

    for result in &results {
        print_result(result);
    }
    println!();
    println!("{}", serde_json::to_string_pretty(&retriever.stats())?);
    Ok(ExitCode::SUCCESS)
}

fn cmd_status(store: &VectorStore, config: &NsrecallConfig) -> anyhow::Result<ExitCode> {
    println!("nsrecall Status");
    println!("===============");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Engine: {}", store.engine_name());
    println!("Collection: {}", store.collection_name());
    println!("Dimensions: {}", store.dimensions());
    match store.count() {
        Ok(count) => println!("Records: {count}"),
        Err(e) => println!("Records: unavailable ({e})"),
    }
    let health = if store.health_check() {
        "Healthy"
    } else {
        "Unreachable"
    };
    println!("Health: {health}");
    if !config.retriever.namespaces.is_empty() {
        println!("Namespaces: {}", config.retriever.namespaces.join(", "));
    }
    Ok(ExitCode::SUCCESS)
}

fn print_result(result: &SearchResult) {
    println!(
        "{:.4}\t{}\t{}\t{}",
        result.score,
        result.namespace,
        result.chunk_id,
        result.content()
    );
}
