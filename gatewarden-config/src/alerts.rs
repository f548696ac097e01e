//! Alert source configuration.
//!
//! Where the IDS writes its JSON alerts and how eagerly the tailer polls it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Alert log tailing parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct AlertSourceConfig {
    /// Path of the append-only JSON alert log. Empty disables scanning.
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Capacity of the outbound address queue.
    #[validate(range(min = 1, max = 1_048_576))]
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Back-off after reaching end-of-file (milliseconds).
    #[validate(range(min = 1, max = 60_000))]
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Back-off after a missing file or read error (milliseconds).
    #[validate(range(min = 1, max = 300_000))]
    #[serde(default = "default_retry_interval")]
    pub retry_interval_ms: u64,

    /// Which address of an alert gets banned: `source` (the attacker) or
    /// `destination` (e.g. a compromised LAN host calling out).
    #[validate(custom(function = validation::validate_block_target))]
    #[serde(default = "default_block_target")]
    pub block_target: String,
}

fn default_log_path() -> PathBuf {
    PathBuf::from("/var/log/snort/alert_json.txt")
}

fn default_buffer_size() -> usize {
    1024
}

fn default_poll_interval() -> u64 {
    200
}

fn default_retry_interval() -> u64 {
    1000
}

fn default_block_target() -> String {
    "source".into()
}

impl Default for AlertSourceConfig {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            buffer_size: default_buffer_size(),
            poll_interval_ms: default_poll_interval(),
            retry_interval_ms: default_retry_interval(),
            block_target: default_block_target(),
        }
    }
}
