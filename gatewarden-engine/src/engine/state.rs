use std::collections::{HashMap, HashSet};

use gatewarden_core::BanEntry;

/// Snapshot-visible tables. Only the event loop writes; anyone may read.
#[derive(Debug, Default)]
pub(crate) struct ProtectionState {
    /// Canonical address -> ban. Iteration order carries no meaning.
    pub bans: HashMap<String, BanEntry>,
    pub whitelist: HashSet<String>,
}

impl ProtectionState {
    pub fn is_tracked(&self, ip: &str) -> bool {
        self.bans.contains_key(ip) || self.whitelist.contains(ip)
    }
}
