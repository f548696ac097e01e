//! ## gatewarden-cli
//! **Operator entry point**
//! Runs the protection daemon on the gateway and exposes maintenance
//! commands for the nftables ban set.
//!
//! ### Expectations:
//! - Configuration is validated before anything touches the firewall
//! - SIGINT/SIGTERM trigger a clean shutdown that lifts every ban

use clap::Parser;
use gatewarden_telemetry::EventLogger;

mod commands;
mod error;
mod shutdown;

use commands::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config.as_deref())?;
    EventLogger::init(&config.telemetry.log_level);

    match cli.command {
        Commands::Run(args) => commands::run_daemon(config, args).await?,
        Commands::Firewall { action } => commands::run_firewall(config, action).await?,
        Commands::CheckConfig => commands::check_config(&config)?,
    }
    Ok(())
}
