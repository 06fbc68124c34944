//! ignitex server - headless signal pipeline
//!
//! Runs the full pipeline against the simulated market feed with sqlite
//! persistence. Metrics are pushed via structured JSON logs to stdout.
//!
//! # Usage
//! ```sh
//! SYMBOLS=BTCUSDT,ETHUSDT cargo run --bin server -- --seed 42
//! ```
//!
//! # Environment Variables
//! - `SYMBOLS` - Comma separated instruments
//! - `DATABASE_URL` - sqlite url (default: sqlite://ignitex.db)
//! - `OBSERVABILITY_ENABLED` - Enable metrics reporting (default: true)
//! - `OBSERVABILITY_INTERVAL` - Seconds between metric outputs (default: 60)
//! - `RUST_LOG` - tracing filter

use anyhow::{Context, Result};
use clap::Parser;
use ignitex::application::system::Application;
use ignitex::config::Config;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Override SYMBOLS (comma separated)
    #[arg(short, long, value_delimiter = ',')]
    symbols: Option<Vec<String>>,

    /// Seed for the simulated feed
    #[arg(long)]
    seed: Option<u64>,

    /// Override DATABASE_URL
    #[arg(long)]
    database_url: Option<String>,

    /// Disable the metrics reporter
    #[arg(long)]
    no_metrics: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false).pretty();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("ignitex server {} starting...", env!("CARGO_PKG_VERSION"));
    info!("Mode: HEADLESS, simulated feed");

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(symbols) = cli.symbols {
        config.pipeline.symbols = symbols
            .into_iter()
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if cli.seed.is_some() {
        config.pipeline.mock_seed = cli.seed;
    }
    if let Some(url) = cli.database_url {
        config.pipeline.database_url = url;
    }
    if cli.no_metrics {
        config.observability.enabled = false;
    }
    config.validate()?;

    info!(
        "Configuration loaded: Symbols={:?}, daily limit {}, min score {}",
        config.pipeline.symbols, config.gate.daily_limit, config.gate.min_accept_score
    );

    let app = Application::build(config).await?;
    let handle = app.start().await?;

    info!("Server running. Press Ctrl+C to shutdown.");
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received.");

    let budget = handle.budget_status().await;
    info!(
        "Published today: {} | Remaining: {} | Queue: {}",
        budget.published_today, budget.remaining, budget.queue_size
    );
    handle.shutdown().await;
    Ok(())
}
