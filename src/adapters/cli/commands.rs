//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the pump.fun tracker.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::jupiter::{JupiterClient, JupiterConfig};
use crate::adapters::pump_fun::ConnectionConfig;
use crate::adapters::sqlite::SqliteStore;
use crate::application::{PriceMonitorConfig, Tracker};
use crate::config::{load_config, Config};
use crate::domain::{short_mint, QualificationFilter};
use crate::ports::{QuoteProvider, TokenStore, SOL_MINT};

const DEFAULT_CONFIG: &str = "config/tracker.toml";

/// Pump.fun launch tracker
#[derive(Parser, Debug)]
#[command(
    name = "pump-tracker",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Streams new pump.fun tokens and tracks their price via Jupiter",
    long_about = "pump-tracker subscribes to the PumpPortal launch feed, keeps tokens that \
                  pass the liquidity filter, polls Jupiter quotes for the most recent ones \
                  and records per-token profit/loss since launch."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream the feed and poll prices until interrupted
    Run(RunCmd),

    /// Show stored profit/loss records
    Status(StatusCmd),

    /// Show the price history of one token
    History(HistoryCmd),

    /// Get the current price of one token
    Quote(QuoteCmd),
}

impl Command {
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Run(cmd) => &cmd.config,
            Command::Status(cmd) => &cmd.config,
            Command::History(cmd) => &cmd.config,
            Command::Quote(cmd) => &cmd.config,
        }
    }
}

/// Start the tracker
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
}

/// Show tracked tokens ranked by profit/loss
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Number of records to show
    #[arg(short, long, default_value = "20")]
    pub limit: usize,
}

/// Show recorded prices for a token
#[derive(Parser, Debug)]
pub struct HistoryCmd {
    /// Token mint address
    #[arg(value_name = "MINT")]
    pub mint: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Number of points to show
    #[arg(short, long, default_value = "50")]
    pub limit: usize,
}

/// Quote the probe amount of SOL into a token
#[derive(Parser, Debug)]
pub struct QuoteCmd {
    /// Token mint address
    #[arg(value_name = "MINT")]
    pub mint: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
}

/// Execute CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let config = load_config(app.command.config_path()).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            app.command.config_path().display()
        )
    })?;

    init_logging(app.verbose, app.debug, &config.logging.level)?;

    match app.command {
        Command::Run(_) => run_command(&config).await,
        Command::Status(cmd) => status_command(&config, cmd).await,
        Command::History(cmd) => history_command(&config, cmd).await,
        Command::Quote(cmd) => quote_command(&config, cmd).await,
    }
}

/// Initialize logging system
fn init_logging(verbose: bool, debug: bool, configured: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(configured))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    Ok(())
}

async fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = config.database.get_path();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    SqliteStore::open(&path)
        .await
        .with_context(|| format!("Failed to open database {}", path.display()))
}

async fn run_command(config: &Config) -> Result<()> {
    tracing::info!("Starting pump.fun tracker...");

    let store = Arc::new(open_store(config).await?);
    let jupiter = JupiterClient::with_config(JupiterConfig::from(config))
        .context("Failed to create Jupiter client")?;

    let tracker = Tracker::new(
        ConnectionConfig::from(config),
        PriceMonitorConfig::from(config),
        QualificationFilter::from(config),
        store.clone(),
        Arc::new(jupiter),
    );

    tracker
        .start()
        .await
        .context("Failed to start tracker")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    tracker.shutdown().await;
    store.close().await;

    tracing::info!("Tracker stopped");
    Ok(())
}

async fn status_command(config: &Config, cmd: StatusCmd) -> Result<()> {
    let store = open_store(config).await?;

    let tracked = store.token_count().await?;
    let records = store
        .list_profit_loss(cmd.limit)
        .await
        .context("Failed to load profit/loss records")?;

    println!("Tracked tokens: {}", tracked);
    println!();
    println!(
        "{:<10} {:>16} {:>16} {:>10}  {}",
        "MINT", "INITIAL", "CURRENT", "P/L %", "UPDATED"
    );
    for record in &records {
        println!(
            "{:<10} {:>16.10} {:>16.10} {:>9.2}%  {}",
            short_mint(&record.mint),
            record.initial_price,
            record.current_price,
            record.profit_loss_pct,
            record.last_updated.format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

async fn history_command(config: &Config, cmd: HistoryCmd) -> Result<()> {
    let store = open_store(config).await?;

    let history = store
        .get_price_history(&cmd.mint)
        .await
        .context("Failed to load price history")?;

    if history.is_empty() {
        println!("No prices recorded for {}", cmd.mint);
        return Ok(());
    }

    println!("{} ({} points, newest first)", cmd.mint, history.len());
    for point in history.iter().take(cmd.limit) {
        println!(
            "{}  {:.12}",
            point.timestamp.format("%Y-%m-%d %H:%M:%S"),
            point.price
        );
    }

    if let Some(record) = store.get_profit_loss(&cmd.mint).await? {
        println!();
        println!(
            "P/L: {:+.12} ({:+.2}%)",
            record.profit_loss, record.profit_loss_pct
        );
    }

    Ok(())
}

async fn quote_command(config: &Config, cmd: QuoteCmd) -> Result<()> {
    let jupiter = JupiterClient::with_config(JupiterConfig::from(config))
        .context("Failed to create Jupiter client")?;

    let quote = jupiter
        .get_quote(SOL_MINT, &cmd.mint, config.monitor.probe_amount_lamports)
        .await
        .with_context(|| format!("Failed to get quote for {}", cmd.mint))?;

    println!("Quote: {} lamports -> {} units", quote.in_amount, quote.out_amount);
    println!("Price: {:.12} SOL per token", quote.price);
    println!("Price impact: {:.4}%", quote.price_impact_pct);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_defaults() {
        let app = CliApp::try_parse_from(["pump-tracker", "run"]).unwrap();
        assert!(matches!(app.command, Command::Run(_)));
        assert_eq!(app.command.config_path(), Path::new(DEFAULT_CONFIG));
        assert!(!app.verbose);
    }

    #[test]
    fn test_parse_status_with_limit() {
        let app = CliApp::try_parse_from([
            "pump-tracker",
            "status",
            "--limit",
            "5",
            "-c",
            "custom.toml",
            "--debug",
        ])
        .unwrap();

        let Command::Status(cmd) = app.command else {
            panic!("Expected status command");
        };
        assert_eq!(cmd.limit, 5);
        assert_eq!(cmd.config, PathBuf::from("custom.toml"));
        assert!(app.debug);
    }

    #[test]
    fn test_history_requires_mint() {
        assert!(CliApp::try_parse_from(["pump-tracker", "history"]).is_err());

        let app = CliApp::try_parse_from(["pump-tracker", "history", "MintA"]).unwrap();
        let Command::History(cmd) = app.command else {
            panic!("Expected history command");
        };
        assert_eq!(cmd.mint, "MintA");
        assert_eq!(cmd.limit, 50);
    }
}
