//! Watchtower agent binary

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watchtower_agent::{Config, WatchtowerAgent};

#[tokio::main]
async fn main() {
    // Initialize tracing
    initialize_tracing();

    info!("Starting Watchtower agent v{}", env!("CARGO_PKG_VERSION"));

    // Missing required settings end the process here with a usage error
    let config = Config::parse();

    let agent = match WatchtowerAgent::new(config) {
        Ok(agent) => agent,
        Err(e) => {
            error!("Failed to initialize agent: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = agent.start().await {
        error!("Fatal error in Watchtower agent: {}", e);
        std::process::exit(1);
    }
}

/// Initialize structured logging
fn initialize_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
