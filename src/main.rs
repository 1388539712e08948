use std::{path::Path, sync::Arc};

use clap::Parser;
use shardkeeper::{
    CleanupOutcome, OpenSearchClient, RetentionRequest, ShardSizeRetentionPolicy,
    config::ShardkeeperConfig,
    observability,
    retention::{self, RetentionRunResult},
};
use tokio_util::sync::CancellationToken;

const DEFAULT_CONFIG_PATH: &str = "shardkeeper.toml";

/// CLI arguments for shardkeeper
#[derive(Parser, Debug)]
#[command(version, about = "Shard-size triggered index retention", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (defaults to ./shardkeeper.toml if it exists,
    /// otherwise built-in defaults are used)
    #[arg(short, long, global = true)]
    config: Option<String>,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Run the retention worker until interrupted (default)
    Serve,
    /// Run a single retention pass over every configured index and exit
    RunOnce,
    /// Evaluate one index against a shard size limit, deleting every
    /// document if a shard is over it
    Check {
        /// Index to evaluate
        #[arg(long)]
        index: String,
        /// A shard larger than this many bytes triggers cleanup
        #[arg(long)]
        max_shard_size_bytes: u64,
        /// Only report the largest shard; never delete
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = load_config(args.config.as_deref());

    if let Err(e) = observability::init_tracing(&config.observability) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let client = match OpenSearchClient::new(&config.engine) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            eprintln!("Failed to create engine client: {}", e);
            std::process::exit(1);
        }
    };

    match args.command {
        None | Some(Command::Serve) => run_server(client, config).await,
        Some(Command::RunOnce) => run_once(client, config).await,
        Some(Command::Check {
            index,
            max_shard_size_bytes,
            dry_run,
        }) => run_check(client, index, max_shard_size_bytes, dry_run).await,
    }
}

fn load_config(explicit_path: Option<&str>) -> ShardkeeperConfig {
    let path = explicit_path.unwrap_or(DEFAULT_CONFIG_PATH);

    if explicit_path.is_none() && !Path::new(path).exists() {
        eprintln!("No config file at {}, using defaults", path);
        return ShardkeeperConfig::default();
    }

    match ShardkeeperConfig::from_file(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", path, e);
            std::process::exit(1);
        }
    }
}

async fn run_server(client: Arc<OpenSearchClient>, config: ShardkeeperConfig) {
    if let Err(e) = observability::metrics::init_metrics(&config.observability.metrics) {
        tracing::warn!(error = %e, "Failed to initialize metrics: {e}");
    }

    tracing::info!(engine = %config.engine.url, "Starting shardkeeper");

    let shutdown = CancellationToken::new();
    let mut worker = tokio::spawn(retention::start_retention_worker(
        client,
        config.retention,
        shutdown.clone(),
    ));

    // The worker returns on its own when disabled or without indices.
    let finished = tokio::select! {
        _ = shutdown_signal() => None,
        joined = &mut worker => Some(joined),
    };
    let joined = match finished {
        Some(joined) => joined,
        None => {
            shutdown.cancel();
            worker.await
        }
    };

    if let Err(e) = joined {
        tracing::error!(error = %e, "Retention worker panicked");
        std::process::exit(1);
    }
}

async fn run_once(client: Arc<OpenSearchClient>, config: ShardkeeperConfig) {
    if !config.retention.has_any_index() {
        println!("No indices configured under [retention], nothing to do");
        return;
    }

    let result = retention::run_once(&client, &config.retention).await;
    print_summary(&result, config.retention.dry_run);

    if result.has_failures() {
        std::process::exit(1);
    }
}

fn print_summary(result: &RetentionRunResult, dry_run: bool) {
    let prefix = if dry_run { "[dry run] " } else { "" };

    for index in &result.indices {
        if index.skipped_missing {
            println!("{}{}: skipped, index does not exist", prefix, index.index);
            continue;
        }
        println!(
            "{}{}: largest shard {} bytes, {} deleted by age, {} deleted by size over {} passes{}",
            prefix,
            index.index,
            index
                .largest_shard_bytes
                .map_or_else(|| "unknown".to_string(), |b| b.to_string()),
            index.age_deleted,
            index.size_deleted,
            index.size_passes,
            if index.over_threshold { " (over limit)" } else { "" },
        );
    }
    for failure in &result.failures {
        println!("{}{}: failed: {}", prefix, failure.index(), failure);
    }
    println!("{}total deleted: {}", prefix, result.total());
}

async fn run_check(
    client: Arc<OpenSearchClient>,
    index: String,
    max_shard_size_bytes: u64,
    dry_run: bool,
) {
    if let Err(e) = client.refresh_topology().await {
        eprintln!("Failed to load routing table: {}", e);
        std::process::exit(1);
    }

    let policy = ShardSizeRetentionPolicy::from_client(client);

    if dry_run {
        match policy.largest_shard_size(&index).await {
            Ok(Some(largest)) => {
                let verdict = if largest > max_shard_size_bytes {
                    "over limit, cleanup would run"
                } else {
                    "under limit"
                };
                println!("{}: largest shard {} bytes, {}", index, largest, verdict);
            }
            Ok(None) => println!("{}: index does not exist", index),
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    let request = RetentionRequest::new(&index, max_shard_size_bytes);
    match policy.evaluate_and_clean(&request).await {
        Ok(CleanupOutcome::IndexMissing) => println!("{}: index does not exist", index),
        Ok(CleanupOutcome::UnderThreshold {
            largest_shard_bytes,
        }) => println!(
            "{}: largest shard {} bytes, under limit",
            index, largest_shard_bytes
        ),
        Ok(CleanupOutcome::Cleaned {
            largest_shard_bytes,
            deleted,
        }) => println!(
            "{}: largest shard {} bytes, deleted {} documents",
            index, largest_shard_bytes, deleted
        ),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, stopping retention worker");
}
