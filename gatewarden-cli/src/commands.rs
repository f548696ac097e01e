use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use gatewarden_config::{AlertSourceConfig, FirewallConfig, GatewardenConfig};
use gatewarden_detection::{dest_filter, AlertFilter, LogAlertSource};
use gatewarden_engine::{EngineError, ProtectionManager, ProtectionSettings};
use gatewarden_prevention::{FirewallBackend, MemoryFirewall, NftablesFirewall};
use gatewarden_telemetry::MetricsRecorder;
use tracing::{error, info, instrument, warn};

use crate::error::CliError;
use crate::shutdown::create_shutdown_token;

#[derive(Parser)]
#[command(name = "gatewarden", version, about)]
pub struct Cli {
    /// Configuration file. Defaults to config/gatewarden.yaml plus
    /// config/<GATEWARDEN_ENV>.yaml when present.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Tail the alert log and enforce bans until SIGINT/SIGTERM
    Run(RunArgs),
    /// Maintain the nftables ban set
    Firewall {
        #[command(subcommand)]
        action: FirewallAction,
    },
    /// Validate the configuration and print the effective values
    CheckConfig,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Keep bans in memory instead of touching the firewall
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum FirewallAction {
    /// Create the table, chain, set and drop rule
    Init,
    /// Delete the table and every ban in it
    Cleanup,
    /// Print the addresses currently in the ban set
    List,
}

pub fn load_config(path: Option<&Path>) -> Result<GatewardenConfig, CliError> {
    let config = match path {
        Some(path) => GatewardenConfig::load_from_path(path)?,
        None => GatewardenConfig::load()?,
    };
    Ok(config)
}

fn nftables(config: &FirewallConfig) -> NftablesFirewall {
    NftablesFirewall::new(&config.nft_path, &config.family, &config.table, &config.set)
        .with_interfaces(&config.lan_interface, &config.wan_interface)
}

/// `None` keeps the source-address default.
fn alert_filter(config: &AlertSourceConfig) -> Option<AlertFilter> {
    match config.block_target.as_str() {
        "destination" => Some(Arc::new(dest_filter) as AlertFilter),
        _ => None,
    }
}

fn alert_source(config: &AlertSourceConfig, metrics: Arc<MetricsRecorder>) -> LogAlertSource {
    LogAlertSource::new(&config.log_path, config.buffer_size, alert_filter(config))
        .with_intervals(
            Duration::from_millis(config.poll_interval_ms),
            Duration::from_millis(config.retry_interval_ms),
        )
        .with_metrics(metrics)
}

#[instrument(skip_all, fields(dry_run = args.dry_run))]
pub async fn run_daemon(config: GatewardenConfig, args: RunArgs) -> Result<(), CliError> {
    let managed = if args.dry_run || config.firewall.backend == "memory" {
        None
    } else {
        Some(Arc::new(nftables(&config.firewall)))
    };

    let backend: Arc<dyn FirewallBackend> = match &managed {
        Some(nft) => {
            if config.firewall.manage_table {
                nft.init().await?;
            }
            nft.clone()
        }
        None => {
            info!("Using in-memory firewall backend");
            Arc::new(MemoryFirewall::new())
        }
    };

    let metrics = Arc::new(MetricsRecorder::new().map_err(EngineError::from)?);
    let manager = ProtectionManager::builder()
        .settings(ProtectionSettings::from(&config.protection))
        .backend(backend)
        .alert_source(Arc::new(alert_source(&config.alerts, metrics.clone())))
        .metrics(metrics)
        .build()?;
    let handle = manager.handle();

    let shutdown = create_shutdown_token();
    manager.start().await?;
    info!(
        log = %config.alerts.log_path.display(),
        ttl_secs = handle.ban_ttl().as_secs(),
        "Gatewarden running"
    );

    shutdown.cancelled().await;
    info!(
        active = handle.snapshot_bans().len(),
        "Shutting down protection manager"
    );
    manager.stop().await;

    if let Some(nft) = managed.filter(|_| config.firewall.manage_table) {
        if let Err(e) = nft.cleanup().await {
            error!("Failed to remove nftables table: {e}");
        }
    }
    info!("Shutdown complete");
    Ok(())
}

pub async fn run_firewall(config: GatewardenConfig, action: FirewallAction) -> Result<(), CliError> {
    if config.firewall.backend == "memory" {
        warn!("Memory backend keeps no state outside a running daemon");
        return Ok(());
    }

    let nft = nftables(&config.firewall);
    match action {
        FirewallAction::Init => nft.init().await?,
        FirewallAction::Cleanup => nft.cleanup().await?,
        FirewallAction::List => {
            for ip in nft.list_banned().await? {
                println!("{ip}");
            }
        }
    }
    Ok(())
}

pub fn check_config(config: &GatewardenConfig) -> Result<(), CliError> {
    print!("{}", serde_yaml::to_string(config)?);
    info!("Configuration is valid");
    Ok(())
}
