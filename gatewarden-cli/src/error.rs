use gatewarden_config::ConfigError;
use gatewarden_engine::EngineError;
use gatewarden_prevention::FirewallError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Firewall error: {0}")]
    Firewall(#[from] FirewallError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Failed to render configuration: {0}")]
    Render(#[from] serde_yaml::Error),
}
