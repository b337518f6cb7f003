mod config;
mod error;
mod indicator;
mod model;
mod normalizer;
mod pipeline;
mod scheduler;
mod signal;
mod source;
mod surface;
mod trend;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use indicator::{NamedIndicator, build_default_indicators, build_indicators};
use pipeline::ChartFeed;
use scheduler::{RefreshScheduler, refresh_once};
use source::build_source;
use surface::ChartSurface;
use surface::terminal::TerminalPanel;

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("source error")]
    Source,
    #[display("runtime error")]
    Runtime,
}

#[derive(Parser)]
#[command(name = "chart-feed", about = "Technical indicator feed for price charts")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Run a single refresh cycle and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = config::load(Path::new(&cli.config)).change_context(AppError::Config)?;

    init_tracing(&config);

    let source = build_source(&config.source).change_context(AppError::Source)?;
    let indicators = configured_indicators(&config)?;
    let surface: Arc<dyn ChartSurface> = Arc::new(TerminalPanel::new(config.panel.recent_signals));
    let mut feed = ChartFeed::new(indicators);

    if cli.once {
        let snapshot = refresh_once(source.as_ref(), &mut feed).await;
        surface.render(&snapshot);
        return Ok(());
    }

    let mut scheduler = RefreshScheduler::new(
        source,
        surface,
        Duration::from_secs(config.refresh.interval_secs),
    );
    if let Some(tick_secs) = config.refresh.tick_secs {
        scheduler = scheduler.with_ticks(Duration::from_secs(tick_secs));
    }
    let handle = scheduler.start(feed);

    tokio::signal::ctrl_c()
        .await
        .change_context(AppError::Runtime)?;

    let last_load = handle.subscribe().borrow().as_ref().map(|s| s.load_id);
    info!(last_load = ?last_load, "ctrl+c received, shutting down");
    handle.stop().await;

    info!("shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

fn configured_indicators(config: &AppConfig) -> Result<Vec<NamedIndicator>, Report<AppError>> {
    if config.indicators.is_empty() {
        return Ok(build_default_indicators());
    }
    build_indicators(&config.indicators).change_context(AppError::Config)
}
