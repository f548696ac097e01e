//! In-process ban set for dry runs and deployments without nftables.
//!
//! Mirrors nft semantics closely enough for the manager: adding an existing
//! element succeeds, deleting a missing one fails.

use std::collections::BTreeSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::info;

use crate::firewall::{FirewallBackend, FirewallError};

#[derive(Debug, Default)]
pub struct MemoryFirewall {
    banned: Mutex<BTreeSet<String>>,
}

impl MemoryFirewall {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `ips` already in the set, as if left over from a previous run.
    pub fn with_banned<I, S>(ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            banned: Mutex::new(ips.into_iter().map(Into::into).collect()),
        }
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.banned.lock().contains(ip)
    }

    pub fn len(&self) -> usize {
        self.banned.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.banned.lock().is_empty()
    }
}

#[async_trait]
impl FirewallBackend for MemoryFirewall {
    async fn block(&self, ip: &str) -> Result<(), FirewallError> {
        if self.banned.lock().insert(ip.to_string()) {
            info!(%ip, "dry-run: added to ban set");
        }
        Ok(())
    }

    async fn unblock(&self, ip: &str) -> Result<(), FirewallError> {
        if self.banned.lock().remove(ip) {
            info!(%ip, "dry-run: removed from ban set");
            Ok(())
        } else {
            Err(FirewallError::NotPresent(ip.to_string()))
        }
    }

    async fn list_banned(&self) -> Result<Vec<String>, FirewallError> {
        Ok(self.banned.lock().iter().cloned().collect())
    }
}
