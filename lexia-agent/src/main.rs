//! Lexia Agent - Main entry point.

use anyhow::{Context, Result};
use lexia_common::config::Config;
use lexia_common::logging::init_logging_with_exclusions;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging_with_exclusions(
        &config.observability.log_level,
        &config.observability.log_format,
        &config.observability.excluded_targets,
    );

    config.validate().context("Invalid configuration")?;

    tracing::info!("Lexia Agent v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        app_name = %config.agent.app_name,
        model = %config.agent.model,
        instruction = %config.agent.instruction,
        reply_endpoint = ?config.agent.reply_endpoint,
        "Agent configured"
    );

    lexia_agent::start_server(&config).await
}
