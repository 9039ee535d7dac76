use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use avspotter::collectors::registry_from_config;
use avspotter::config::Config;
use avspotter::metrics;
use avspotter::models::{OutcomeStatus, Provider};
use avspotter::orchestrator::Orchestrator;
use avspotter::storage::SqliteStore;
use avspotter::utils::normalize_plate;

#[derive(Parser)]
#[command(
    name = "avspotter",
    version,
    about = "Autonomous vehicle sighting pipeline",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one scrape cycle
    Run {
        /// Lookback window in hours
        #[arg(long)]
        lookback_hours: Option<i64>,

        /// Maximum collectors running at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Print Prometheus metrics after the cycle
        #[arg(long, default_value = "false")]
        metrics: bool,
    },

    /// Show configured collectors and stored outcomes
    Health,

    /// Manage the tracked fleet
    Fleet {
        #[command(subcommand)]
        action: FleetAction,
    },

    /// Manage moderation submissions
    Submission {
        #[command(subcommand)]
        action: SubmissionAction,
    },
}

#[derive(Subcommand)]
enum FleetAction {
    /// Add a known vehicle
    Add {
        /// License plate
        plate: String,

        /// Operator (tesla, waymo, zoox)
        provider: Provider,
    },
}

#[derive(Subcommand)]
enum SubmissionAction {
    /// Record a moderation decision; resolved plates are no longer pending
    Resolve {
        /// Submission id
        id: String,

        /// Moderation decision
        #[arg(value_parser = ["approved", "rejected"])]
        status: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    // Initialize tracing/logging
    let format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(format, &config.logging.level, cli.verbose)?;

    tracing::info!("avspotter starting");

    match cli.command {
        Commands::Run {
            lookback_hours,
            concurrency,
            metrics,
        } => {
            tracing::info!(
                lookback_hours = ?lookback_hours,
                concurrency = ?concurrency,
                "Starting run command"
            );
            run(config, lookback_hours, concurrency, metrics).await?;
        }

        Commands::Health => health(&config)?,

        Commands::Fleet {
            action: FleetAction::Add { plate, provider },
        } => {
            tracing::info!(plate = %plate, provider = %provider, "Starting fleet add command");
            fleet_add(&config, &plate, provider)?;
        }

        Commands::Submission {
            action: SubmissionAction::Resolve { id, status },
        } => {
            tracing::info!(id = %id, status = %status, "Starting submission resolve command");
            submission_resolve(&config, &id, &status)?;
        }
    }

    tracing::info!("avspotter completed successfully");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("avspotter=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("avspotter={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}

async fn run(
    config: Config,
    lookback_hours: Option<i64>,
    concurrency: Option<usize>,
    print_metrics: bool,
) -> Result<()> {
    if let Err(e) = metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics disabled");
    }

    let lookback_hours = lookback_hours.unwrap_or(config.registry.lookback_hours);
    if lookback_hours <= 0 {
        anyhow::bail!("lookback-hours must be positive");
    }
    let lookback = chrono::TimeDelta::try_hours(lookback_hours)
        .with_context(|| format!("lookback-hours {lookback_hours} is out of range"))?;
    let concurrency = concurrency.unwrap_or(config.registry.concurrency).max(1);

    if config.registry.collectors.is_empty() {
        tracing::warn!("No collectors configured");
    }
    if config.vision.api_key.is_none() {
        tracing::warn!("No vision API key configured");
    }

    let orchestrator = Orchestrator::from_config(&config).with_context(|| {
        format!(
            "Failed to set up pipeline (store: {})",
            config.store.sqlite_path.display()
        )
    })?;

    let report = orchestrator.run_cycle(lookback, concurrency).await;

    println!("Scrape cycle complete in {:.1}s", report.elapsed.as_secs_f64());
    println!("  Discovered: {}", report.discovered);
    println!("  Processed:  {}", report.processed);
    println!("  Skipped:    {}", report.skipped);
    for status in OutcomeStatus::all() {
        println!("    {:<15} {}", status.as_str(), report.count(status));
    }
    if report.check_failures > 0 || report.write_failures > 0 {
        println!(
            "  Store failures: {} checks, {} writes",
            report.check_failures, report.write_failures
        );
    }

    println!();
    println!("{:<20} {:<10} {:<9} {}", "COLLECTOR", "STATUS", "FAILURES", "LAST ERROR");
    for status in orchestrator.registry().health_snapshot() {
        println!(
            "{:<20} {:<10} {:<9} {}",
            status.name,
            status.health.status.as_str(),
            status.health.consecutive_failures,
            status.health.last_error.as_deref().unwrap_or("-")
        );
    }

    if print_metrics {
        if metrics::metrics_initialized() {
            let text = metrics::encode_metrics().map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!();
            print!("{text}");
        } else {
            tracing::warn!("Metrics were not initialized, nothing to print");
        }
    }

    Ok(())
}

fn health(config: &Config) -> Result<()> {
    let registry = registry_from_config(&config.registry);
    let snapshot = registry.health_snapshot();

    if snapshot.is_empty() {
        println!("No collectors configured");
    } else {
        println!(
            "{:<20} {:<8} {:<9} {:<10} {}",
            "COLLECTOR", "ENABLED", "PRIORITY", "STATUS", "COMMAND"
        );
        for status in snapshot {
            let command = config
                .registry
                .collectors
                .iter()
                .find(|c| c.name == status.name)
                .map(|c| format!("{} {}", c.command, c.args.join(" ")))
                .unwrap_or_default();

            println!(
                "{:<20} {:<8} {:<9} {:<10} {}",
                status.name,
                status.enabled,
                status.priority,
                status.health.status.as_str(),
                command.trim_end()
            );
        }
    }

    // Do not create a database just to report on it
    if !config.store.sqlite_path.exists() {
        return Ok(());
    }

    let store = SqliteStore::new(&config.store.sqlite_path)?;
    let counts = store.outcome_counts()?;

    println!();
    println!("{:<15} {}", "OUTCOME", "ITEMS");
    for status in OutcomeStatus::all() {
        let count = counts
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n);
        println!("{:<15} {}", status.as_str(), count);
    }

    Ok(())
}

fn fleet_add(config: &Config, plate: &str, provider: Provider) -> Result<()> {
    let plate = normalize_plate(plate).context("Plate has no alphanumeric characters")?;
    let store = SqliteStore::new(&config.store.sqlite_path)?;

    if store.add_fleet_vehicle(&plate, provider)? {
        println!("Added {plate} ({provider}) to the fleet");
    } else {
        println!("{plate} ({provider}) is already in the fleet");
    }

    Ok(())
}

fn submission_resolve(config: &Config, id: &str, status: &str) -> Result<()> {
    let store = SqliteStore::new(&config.store.sqlite_path)?;

    if store.set_submission_status(id, status)? {
        println!("Submission {id} marked {status}");
    } else {
        anyhow::bail!("No submission with id {id}");
    }

    Ok(())
}
