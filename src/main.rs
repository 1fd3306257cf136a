//! reqmeter - request metrics in front of an HTTP application
//!
//! Usage:
//!     reqmeter --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use reqmeter::config::{Config, load_config};
use reqmeter::frontend::FrontendListener;
use reqmeter::util::init_logging;
use reqmeter::AppState;

/// Serve request metrics on the application's own listener.
#[derive(Parser, Debug)]
#[command(name = "reqmeter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // CLI overrides config
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);

    init_logging(log_level, &config.global.log_format);

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Listen: {}", config.server.listen);
        println!("  Metrics path: {}", config.metrics.path);
        println!(
            "  Upstream: {} ({})",
            config.upstream.address, config.upstream.name
        );
        return Ok(());
    }

    info!(
        config_path = %cli.config.display(),
        listen = %config.server.listen,
        host = %config.server.host,
        metrics_path = %config.metrics.path,
        upstream = %config.upstream.address,
        "reqmeter starting"
    );

    run(config)
}

/// Run the host with the given configuration.
fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config).await })
}

/// Async entry point.
async fn run_async(config: Config) -> Result<()> {
    // Duplicate instruments or a bad route table abort startup here.
    let state = AppState::new(config).context("failed to initialize request metrics")?;

    let listener = FrontendListener::bind(&state).await.with_context(|| {
        format!(
            "failed to bind frontend '{}' on {}",
            state.config().server.name,
            state.config().server.listen
        )
    })?;

    let sweeper = state.sweeper();
    let sweeper_guard = state.pools().enter_background();
    let sweeper_shutdown = state.shutdown().subscribe();
    let sweeper_handle = tokio::spawn(async move {
        let _guard = sweeper_guard;
        sweeper.run(sweeper_shutdown).await;
    });

    let listener_handle = tokio::spawn(listener.run(state.shutdown().subscribe()));

    info!("reqmeter is running");
    info!("press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    state.trigger_shutdown();

    let _ = listener_handle.await;
    let _ = sweeper_handle.await;

    info!(
        pending = state.hook().pending(),
        "reqmeter shut down complete"
    );
    Ok(())
}
