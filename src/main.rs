//! range-harvester main entry point
//!
//! This is the command-line interface for the resumable range harvester.

use anyhow::Context;
use clap::Parser;
use range_harvester::config::{load_config_with_hash, Config};
use range_harvester::output::{load_statistics, print_statistics};
use range_harvester::state::HarvestState;
use range_harvester::storage::{CheckpointStore, JsonCheckpointStore};
use range_harvester::Harvester;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// range-harvester: resumable bulk collection over an id range
///
/// Fetches one record per identifier from a rate-limited API, checkpointing
/// as it goes. Re-running with the same config resumes where the last run
/// stopped and retries identifiers that failed.
#[derive(Parser, Debug)]
#[command(name = "range-harvester")]
#[command(version = "1.0.0")]
#[command(about = "Resumable bulk collection over an id range", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show how much work remains without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "export_failed"])]
    dry_run: bool,

    /// Show statistics from the checkpoint files and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_failed"])]
    stats: bool,

    /// Write the failed-IDs file from the checkpoint and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_failed: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load and validate configuration
    let (config, config_hash) = load_config_with_hash(&cli.config).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            cli.config.display()
        )
    })?;

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet, config.output.log_path.as_deref())?;
    tracing::info!(
        "Configuration loaded from {} (hash: {})",
        cli.config.display(),
        config_hash
    );

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_failed {
        handle_export_failed(&config)?;
    } else {
        handle_harvest(config).await?;
    }

    Ok(())
}

/// Sets up the console subscriber and, when configured, an appending log file
fn setup_logging(verbose: u8, quiet: bool, log_path: Option<&Path>) -> anyhow::Result<()> {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("range_harvester=info,warn"),
            1 => EnvFilter::new("range_harvester=debug,info"),
            2 => EnvFilter::new("range_harvester=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let file_layer = match log_path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false),
        )
        .with(file_layer)
        .init();

    Ok(())
}

/// Handles the --dry-run mode: validates config and shows the remaining work
fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    println!("=== range-harvester Dry Run ===\n");

    println!("API:");
    println!("  Endpoint: {}", config.api.endpoint);
    println!("  Form field: {}", config.api.id_param);
    println!("  Name field: {}", config.api.name_field);
    println!("  Request timeout: {}ms", config.api.request_timeout_ms);

    println!("\nHarvest:");
    println!(
        "  Identifier range: {}..={} ({} ids)",
        config.harvest.first_id,
        config.harvest.last_id(),
        config.harvest.total_ids
    );
    println!(
        "  Concurrent requests: {}",
        config.harvest.max_concurrent_requests
    );
    println!("  Save every: {} successes", config.harvest.save_every);
    println!(
        "  Delay between requests: {}-{}ms",
        config.harvest.min_delay_ms, config.harvest.max_delay_ms
    );
    println!(
        "  Jitter before requests: {}-{}ms",
        config.harvest.jitter_min_ms, config.harvest.jitter_max_ms
    );

    println!("\nBackoff:");
    println!(
        "  Initial: {}ms, factor {}, max {}ms",
        config.backoff.initial_ms, config.backoff.factor, config.backoff.max_ms
    );
    println!(
        "  Gives up after {} attempts or {}s",
        config.backoff.max_attempts, config.backoff.max_elapsed_secs
    );

    println!("\nOutput:");
    println!("  Dataset: {}", config.output.dataset_path.display());
    println!("  Progress: {}", config.output.progress_path.display());
    if let Some(log_path) = &config.output.log_path {
        println!("  Log: {}", log_path.display());
    }

    let store = JsonCheckpointStore::from_config(&config.output);
    let stats = load_statistics(&store, &config.harvest)?;

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would queue {} of {} ids ({} already completed)",
        stats.remaining, stats.total_ids, stats.completed
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the checkpoint files
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Progress: {}", config.output.progress_path.display());
    println!("Dataset: {}\n", config.output.dataset_path.display());

    let store = JsonCheckpointStore::from_config(&config.output);
    let stats = load_statistics(&store, &config.harvest)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-failed mode: writes the failed-IDs file
fn handle_export_failed(config: &Config) -> anyhow::Result<()> {
    println!("=== Exporting Failed IDs ===\n");

    let store = JsonCheckpointStore::from_config(&config.output);
    let loaded = store.load()?;
    let state = HarvestState::reconcile(loaded.progress, loaded.dataset, config.harvest.save_every);

    match store.export_failed(&state.progress().failed)? {
        Some(path) => println!(
            "✓ {} failed IDs exported to: {}",
            state.progress().failed.len(),
            path.display()
        ),
        None => println!("No failed IDs to export"),
    }

    Ok(())
}

/// Handles the main harvest operation
async fn handle_harvest(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        "Starting harvest of {} ids with {} workers",
        config.harvest.total_ids,
        config.harvest.max_concurrent_requests
    );

    let harvester = Harvester::new(config)?;

    let cancel = harvester.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, stopping workers");
            cancel.cancel();
        }
    });

    match harvester.run().await {
        Ok(report) => {
            report.log_summary();
            if report.interrupted {
                tracing::info!("Scraping interrupted by user. Progress has been saved.");
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!(
                "Scraping crashed: {}. You can resume by running the program again.",
                e
            );
            Err(e.into())
        }
    }
}
