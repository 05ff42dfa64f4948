//! # Warehouse Connectivity Check
//!
//! Command-line tool for validating the warehouse endpoint configuration,
//! probing both endpoints, or running the failover layer in the foreground
//! to watch failover and failback happen.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use warehouse_failover::logging::init_structured_logging;
use warehouse_failover::{
    ConfigLoader, EndpointRegistry, FailoverSystem, HealthProber, PgBackend, WarehouseConfig,
};

#[derive(Parser)]
#[command(name = "warehouse-check")]
#[command(about = "Validate and probe warehouse failover configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (default: config/warehouse.toml or WAREHOUSE_CONFIG_PATH)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate configuration, printing it with credentials masked
    Validate,

    /// Probe both endpoints once
    Probe,

    /// Run the connection manager and recovery monitor until Ctrl-C
    Run {
        /// How often to log the current connection state
        #[arg(long, default_value_t = 10)]
        report_interval_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    init_structured_logging();
    let cli = Cli::parse();

    let result = match load_config(&cli) {
        Ok(config) => match &cli.command {
            Some(Commands::Validate) | None => validate(&config),
            Some(Commands::Probe) => probe(&config).await,
            Some(Commands::Run {
                report_interval_secs,
            }) => run(&config, Duration::from_secs(*report_interval_secs)).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!(error = %format!("{e:#}"), "warehouse-check failed");
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<WarehouseConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_file(path);
    }
    loader.load().context("loading warehouse configuration")
}

fn validate(config: &WarehouseConfig) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&config.sanitized())?);
    println!("Configuration is valid");
    Ok(())
}

async fn probe(config: &WarehouseConfig) -> anyhow::Result<()> {
    let registry = EndpointRegistry::from_config(config)?;
    let backend = Arc::new(PgBackend::new(config.pool.clone()));
    let prober = HealthProber::new(backend, config.probe.timeout());

    let primary = prober.check_endpoint(registry.primary()).await;
    let backup = prober.check_endpoint(registry.backup()).await;

    for (endpoint, outcome) in [(registry.primary(), &primary), (registry.backup(), &backup)] {
        match &outcome.failure {
            None => println!("{endpoint}: alive ({}ms)", outcome.latency_ms),
            Some(reason) => println!("{endpoint}: DEAD ({}ms) - {reason}", outcome.latency_ms),
        }
    }

    if !primary.alive && !backup.alive {
        anyhow::bail!("neither warehouse endpoint is reachable");
    }
    Ok(())
}

async fn run(config: &WarehouseConfig, report_interval: Duration) -> anyhow::Result<()> {
    let system = FailoverSystem::bootstrap(config)
        .await
        .context("starting warehouse failover")?;

    let mut report = tokio::time::interval(report_interval);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            _ = &mut interrupt => {
                info!("Interrupt received; shutting down");
                break;
            }
            _ = report.tick() => {
                match system.manager().get_handle().await {
                    Ok(_) => info!(snapshot = %serde_json::json!(system.manager().snapshot()), "Warehouse connection"),
                    Err(e) => error!(error = %e, retryable = e.is_retryable(), "Warehouse unavailable"),
                }
            }
        }
    }

    system.shutdown().await;
    Ok(())
}
