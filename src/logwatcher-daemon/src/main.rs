//! LogWatcher — pattern-driven log alerting daemon.
//!
//! Tails the log files named in a TOML configuration, evaluates each new
//! line against a library of named regexes, and fans admitted matches out
//! to notification sinks (email, Slack, Teams, Telegram, syslog) subject to
//! per-`(file, pattern)` rate limiting.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use logwatcher_daemon::config::ConfigManager;
use logwatcher_daemon::daemon::Daemon;

#[derive(Parser)]
#[command(name = "logwatcher")]
#[command(about = "Tails configured log files and fans matches out to alerting sinks")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file.
    config_path: Option<PathBuf>,

    /// Log admitted matches but do not invoke any notification sink.
    #[arg(long)]
    test: bool,

    /// Enable debug-level logging.
    #[arg(long)]
    debug: bool,

    /// Address to expose Prometheus metrics on (e.g. 0.0.0.0:9898). Disabled
    /// unless given.
    #[arg(long)]
    metrics_addr: Option<std::net::SocketAddr>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default configuration skeleton and exit.
    GenerateConfig {
        /// Output path for the generated file.
        #[arg(short, long, default_value = "logwatcher.toml")]
        output: PathBuf,
        /// Overwrite an existing file at the output path.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match cli.command {
        Some(Command::GenerateConfig { output, force }) => generate_config(output, force).await,
        None => {
            let config_path = cli.config_path.context(
                "a configuration file path is required (see `logwatcher generate-config --help`)",
            )?;
            if let Some(addr) = cli.metrics_addr {
                init_metrics(addr)?;
            }
            run_daemon(config_path, cli.test).await
        }
    }
}

async fn run_daemon(config_path: PathBuf, test_mode: bool) -> Result<()> {
    let mut config_manager = ConfigManager::new();
    config_manager
        .load_from_file(&config_path)
        .await
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;
    config_manager
        .start_hot_reload()
        .await
        .context("failed to start configuration hot-reload")?;

    info!("logwatcher v{} starting", env!("CARGO_PKG_VERSION"));
    let daemon = Daemon::new(config_manager, test_mode).await?;
    daemon.run().await
}

async fn generate_config(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("configuration file already exists: {}", output.display());
    }
    let manager = ConfigManager::new();
    manager.save_to_file(&output).await?;
    info!("generated configuration file: {}", output.display());
    Ok(())
}

fn init_tracing(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_metrics(addr: std::net::SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("failed to install prometheus metrics exporter")?;
    info!(%addr, "metrics endpoint started");
    Ok(())
}
