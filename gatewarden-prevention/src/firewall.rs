//! ## gatewarden-prevention::firewall
//! **Ban-set backend contract**
//!
//! Implementations are not required to be idempotent; callers that need
//! at-most-once semantics (the protection manager) supply them.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FirewallError {
    #[error("nft {action} failed: {output}")]
    CommandFailed { action: String, output: String },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("refusing unsafe set element {0:?}")]
    UnsafeElement(String),

    #[error("{0} is not in the ban set")]
    NotPresent(String),
}

/// Executes and queries the packet-filter ban set.
#[async_trait]
pub trait FirewallBackend: Send + Sync {
    /// Add `ip` to the ban set.
    async fn block(&self, ip: &str) -> Result<(), FirewallError>;

    /// Remove `ip` from the ban set.
    async fn unblock(&self, ip: &str) -> Result<(), FirewallError>;

    /// Addresses currently in the ban set, as the backend renders them.
    async fn list_banned(&self) -> Result<Vec<String>, FirewallError>;
}
