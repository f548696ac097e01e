//! nftables backend.
//!
//! Bans live as elements of a named set; a single forward-chain rule drops
//! LAN→WAN traffic whose source is in the set.

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::firewall::{FirewallBackend, FirewallError};

/// Only digits, dots, colons and lowercase hex may reach the nft command line.
fn is_safe_element(ip: &str) -> bool {
    !ip.is_empty()
        && ip
            .chars()
            .all(|c| c.is_ascii_digit() || c == '.' || c == ':' || ('a'..='f').contains(&c))
}

/// Body of the `elements = { ... }` block. Table and set names may contain
/// the word `elements`, so only the keyword followed by `= {` counts.
fn elements_block(output: &str) -> Option<&str> {
    output.match_indices("elements").find_map(|(at, keyword)| {
        let rest = output[at + keyword.len()..].trim_start();
        let body = rest.strip_prefix('=')?.trim_start().strip_prefix('{')?;
        body.find('}').map(|close| &body[..close])
    })
}

/// Extract the members of the `elements = { ... }` block in `nft list set`
/// output. Per-element annotations (`timeout`, `expires`) are discarded.
pub fn parse_set_elements(output: &str) -> Vec<String> {
    let Some(body) = elements_block(output) else {
        return Vec::new();
    };

    body.split(',')
        .filter_map(|element| element.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

pub struct NftablesFirewall {
    nft_path: String,
    family: String,
    table: String,
    set: String,
    lan_interface: String,
    wan_interface: String,
}

impl NftablesFirewall {
    pub fn new(nft_path: &str, family: &str, table: &str, set: &str) -> Self {
        Self {
            nft_path: nft_path.to_string(),
            family: family.to_string(),
            table: table.to_string(),
            set: set.to_string(),
            lan_interface: "br-lan".into(),
            wan_interface: "eth0".into(),
        }
    }

    /// Interfaces the drop rule installed by [`init`](Self::init) matches on.
    pub fn with_interfaces(mut self, lan: &str, wan: &str) -> Self {
        self.lan_interface = lan.to_string();
        self.wan_interface = wan.to_string();
        self
    }

    fn element_args(&self, action: &str, ip: &str) -> Vec<String> {
        vec![
            action.into(),
            "element".into(),
            self.family.clone(),
            self.table.clone(),
            self.set.clone(),
            format!("{{ {ip} }}"),
        ]
    }

    fn init_commands(&self) -> Vec<Vec<String>> {
        let (family, table, set) = (&self.family, &self.table, &self.set);
        vec![
            vec!["add".into(), "table".into(), family.clone(), table.clone()],
            vec![
                "add".into(),
                "chain".into(),
                family.clone(),
                table.clone(),
                "forward".into(),
                "{ type filter hook forward priority 30 ; policy accept ; }".into(),
            ],
            vec![
                "create".into(),
                "set".into(),
                family.clone(),
                table.clone(),
                set.clone(),
                "{ type ipv4_addr; }".into(),
            ],
        ]
    }

    fn drop_rule_args(&self) -> Vec<String> {
        vec![
            "add".into(),
            "rule".into(),
            self.family.clone(),
            self.table.clone(),
            "forward".into(),
            "iifname".into(),
            self.lan_interface.clone(),
            "oifname".into(),
            self.wan_interface.clone(),
            "ip".into(),
            "saddr".into(),
            format!("@{}", self.set),
            "drop".into(),
        ]
    }

    /// Whether `nft list chain` output already carries the drop rule for our set.
    fn has_drop_rule(&self, chain_listing: &str) -> bool {
        let needle = format!("saddr @{} drop", self.set);
        chain_listing.contains(&needle)
    }

    async fn run(&self, args: &[String]) -> Result<String, FirewallError> {
        debug!(nft = %self.nft_path, ?args, "Running nft");
        let output = Command::new(&self.nft_path)
            .args(args)
            .output()
            .await
            .map_err(|source| FirewallError::Spawn {
                program: self.nft_path.clone(),
                source,
            })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(FirewallError::CommandFailed {
                action: args.join(" "),
                output: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn modify_set(&self, action: &str, ip: &str) -> Result<(), FirewallError> {
        if !is_safe_element(ip) {
            return Err(FirewallError::UnsafeElement(ip.to_string()));
        }
        self.run(&self.element_args(action, ip)).await.map(|_| ())
    }

    /// Create the table, forward chain, ban set and drop rule.
    ///
    /// An already existing set is accepted so bans survive a process restart,
    /// and the drop rule is only added if a previous run did not leave it behind.
    pub async fn init(&self) -> Result<(), FirewallError> {
        for args in self.init_commands() {
            match self.run(&args).await {
                Ok(_) => {}
                Err(FirewallError::CommandFailed { output, .. })
                    if args[0] == "create"
                        && (output.contains("File exists") || output.contains("already exists")) =>
                {
                    debug!(set = %self.set, "Ban set already exists");
                }
                Err(e) => return Err(e),
            }
        }

        let list_chain = vec![
            "list".to_string(),
            "chain".to_string(),
            self.family.clone(),
            self.table.clone(),
            "forward".to_string(),
        ];
        let chain = self.run(&list_chain).await?;
        if self.has_drop_rule(&chain) {
            debug!(set = %self.set, "Drop rule already installed");
        } else {
            self.run(&self.drop_rule_args()).await?;
        }
        info!(table = %self.table, set = %self.set, "nftables ban set ready");
        Ok(())
    }

    /// Delete the whole table, including any remaining bans.
    pub async fn cleanup(&self) -> Result<(), FirewallError> {
        let args = vec![
            "delete".to_string(),
            "table".to_string(),
            self.family.clone(),
            self.table.clone(),
        ];
        self.run(&args).await?;
        info!(table = %self.table, "nftables table removed");
        Ok(())
    }
}

#[async_trait]
impl FirewallBackend for NftablesFirewall {
    async fn block(&self, ip: &str) -> Result<(), FirewallError> {
        self.modify_set("add", ip).await
    }

    async fn unblock(&self, ip: &str) -> Result<(), FirewallError> {
        self.modify_set("delete", ip).await
    }

    async fn list_banned(&self) -> Result<Vec<String>, FirewallError> {
        let args = vec![
            "list".to_string(),
            "set".to_string(),
            self.family.clone(),
            self.table.clone(),
            self.set.clone(),
        ];
        let output = self.run(&args).await?;
        let elements = parse_set_elements(&output);
        if elements.is_empty() && output.contains("elements") {
            warn!("nft listed elements but none could be parsed");
        }
        Ok(elements)
    }
}
