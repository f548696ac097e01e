use thiserror::Error;

/// Errors surfaced synchronously to whoever constructs or starts the manager.
/// Everything that happens inside the event loop is logged instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protection manager already started")]
    AlreadyStarted,

    #[error("Metrics registry error: {0}")]
    Telemetry(#[from] prometheus::Error),
}
