//! Firewall backend configuration.
//!
//! Parameters for the nftables ban set the gateway enforces:
//! - which backend executes bans
//! - the table/set the bans live in
//! - the LAN/WAN interfaces the drop rule is bound to

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Firewall backend configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct FirewallConfig {
    /// Backend executing bans (nftables, memory).
    #[validate(custom(function = validation::validate_backend))]
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Path to the `nft` binary.
    #[validate(length(min = 1))]
    #[serde(default = "default_nft_path")]
    pub nft_path: String,

    /// nftables address family of the table.
    #[validate(custom(function = validation::validate_family))]
    #[serde(default = "default_family")]
    pub family: String,

    #[validate(custom(function = validation::validate_identifier))]
    #[serde(default = "default_table")]
    pub table: String,

    #[validate(custom(function = validation::validate_identifier))]
    #[serde(default = "default_set")]
    pub set: String,

    /// Interface facing the protected network.
    #[validate(custom(function = validation::validate_interface))]
    #[serde(default = "default_lan_interface")]
    pub lan_interface: String,

    /// Interface facing the uplink.
    #[validate(custom(function = validation::validate_interface))]
    #[serde(default = "default_wan_interface")]
    pub wan_interface: String,

    /// Create the table on startup and delete it on shutdown.
    #[serde(default = "default_true")]
    pub manage_table: bool,
}

fn default_backend() -> String {
    "nftables".into()
}
fn default_nft_path() -> String {
    "nft".into()
}
fn default_family() -> String {
    "inet".into()
}
fn default_table() -> String {
    "gatewarden".into()
}
fn default_set() -> String {
    "ban_set".into()
}
fn default_lan_interface() -> String {
    "br-lan".into()
}
fn default_wan_interface() -> String {
    "eth0".into()
}
fn default_true() -> bool {
    true
}

impl Default for FirewallConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            nft_path: default_nft_path(),
            family: default_family(),
            table: default_table(),
            set: default_set(),
            lan_interface: default_lan_interface(),
            wan_interface: default_wan_interface(),
            manage_table: default_true(),
        }
    }
}
