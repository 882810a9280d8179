mod cli;
mod config;
mod error;
mod garmin;
mod models;
mod sheets;
mod sync;

use clap::Parser;

use crate::cli::Cli;
use crate::config::Config;
use tracing::error;
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

#[tokio::main]
async fn main() {
    // Profiles may come from a .env file
    dotenvy::dotenv().ok();

    // Initialize logging; progress bars are drawn by the indicatif layer
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();

    let cli = Cli::parse();

    let result = match Config::load() {
        Ok(config) => cli.run(&config).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}
