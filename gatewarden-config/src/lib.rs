//! # Gatewarden Configuration System
//!
//! Hierarchical configuration for the gateway intrusion-response engine.
//!
//! ## Features
//! - **Unified Configuration**: one tree for the manager, the alert tailer,
//!   the firewall backend and telemetry
//! - **Validation**: every section is checked with `validator` before use
//! - **Environment Awareness**: per-environment YAML overrides and
//!   `GATEWARDEN_*` variables

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod alerts;
mod error;
mod firewall;
mod protection;
mod telemetry;
mod validation;

pub use alerts::AlertSourceConfig;
pub use error::ConfigError;
pub use firewall::FirewallConfig;
pub use protection::ProtectionConfig;
pub use telemetry::TelemetryConfig;

/// Base configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/gatewarden.yaml";

/// Top‑level configuration container for all Gatewarden components.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
pub struct GatewardenConfig {
    /// Ban/whitelist manager parameters.
    #[validate(nested)]
    #[serde(default)]
    pub protection: ProtectionConfig,

    /// IDS alert log tailing.
    #[validate(nested)]
    #[serde(default)]
    pub alerts: AlertSourceConfig,

    /// Packet-filter backend.
    #[validate(nested)]
    #[serde(default)]
    pub firewall: FirewallConfig,

    /// Logging.
    #[validate(nested)]
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl GatewardenConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default Values
    /// 2. `config/gatewarden.yaml` - Base settings. If missing, defaults are used.
    /// 3. `config/<environment>.yaml` - Environment‑specific overrides.
    /// 4. `GATEWARDEN_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(GatewardenConfig::default()));

        if Path::new(DEFAULT_CONFIG_PATH).exists() {
            figment = figment.merge(Yaml::file(DEFAULT_CONFIG_PATH));
        } else {
            eprintln!("{DEFAULT_CONFIG_PATH} not found, using default configuration");
        }

        let env = std::env::var("GATEWARDEN_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract(figment)
    }

    /// Load configuration from a specific path, still honouring `GATEWARDEN_*`
    /// overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(PathBuf::from(path)));
        }

        let figment = Figment::from(Serialized::defaults(GatewardenConfig::default()))
            .merge(Yaml::file(path));

        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed("GATEWARDEN_").split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}
