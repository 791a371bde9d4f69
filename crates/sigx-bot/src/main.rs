//! sigx - Entry Point
//!
//! Loads configuration, rebuilds the queue from the journal, enqueues any
//! signals given on the command line and runs the worker pools.

use anyhow::Result;
use clap::Parser;
use tracing::info;

/// sigx signal execution service
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via SIGX_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// JSON Lines file of signals to enqueue at startup
    #[arg(short, long)]
    signals: Option<String>,

    /// Process every due signal once and exit instead of running workers
    #[arg(long)]
    drain: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    sigx_telemetry::init_logging()?;

    info!("Starting sigx v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > SIGX_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("SIGX_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = sigx_bot::AppConfig::from_file(&config_path)?;
    info!(
        accounts = config.accounts.len(),
        data_dir = %config.persistence.data_dir.display(),
        "Configuration loaded"
    );

    let app = sigx_bot::Application::init(config).await?;

    if let Some(path) = &args.signals {
        app.enqueue_file(path)?;
    }

    if args.drain {
        let processed = app.drain().await?;
        info!(processed, "Drain complete");
        app.shutdown()?;
        return Ok(());
    }

    app.run().await?;
    Ok(())
}
