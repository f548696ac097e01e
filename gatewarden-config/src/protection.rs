//! Protection manager configuration.
//!
//! Ban lifetime, sweep cadence and request-queue sizing. Zero values for the
//! two durations fall back to the manager's built-in defaults.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Protection manager configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
pub struct ProtectionConfig {
    /// Lifetime of a non-permanent ban (seconds).
    #[serde(default = "default_ban_ttl")]
    pub ban_ttl_secs: u64,

    /// Interval between expiry sweeps (milliseconds).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: u64,

    /// Capacity of each inbound request queue.
    #[validate(range(min = 1, max = 1_048_576))]
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Addresses whitelisted at startup.
    #[validate(custom(function = validation::validate_address_list))]
    #[serde(default)]
    pub whitelist: Vec<String>,
}

fn default_ban_ttl() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    10_000
}

fn default_queue_capacity() -> usize {
    1024
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            ban_ttl_secs: default_ban_ttl(),
            sweep_interval_ms: default_sweep_interval(),
            queue_capacity: default_queue_capacity(),
            whitelist: Vec::new(),
        }
    }
}
