use std::time::Duration;

use gatewarden_config::ProtectionConfig;

pub const DEFAULT_BAN_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Runtime parameters of the protection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectionSettings {
    pub ban_ttl: Duration,
    pub sweep_interval: Duration,
    /// Capacity of each inbound request queue.
    pub queue_capacity: usize,
    /// Seeded into the whitelist on start.
    pub whitelist: Vec<String>,
}

impl ProtectionSettings {
    /// Replace zero values with the built-in defaults.
    pub fn normalized(mut self) -> Self {
        if self.ban_ttl.is_zero() {
            self.ban_ttl = DEFAULT_BAN_TTL;
        }
        if self.sweep_interval.is_zero() {
            self.sweep_interval = DEFAULT_SWEEP_INTERVAL;
        }
        if self.queue_capacity == 0 {
            self.queue_capacity = DEFAULT_QUEUE_CAPACITY;
        }
        self
    }
}

impl Default for ProtectionSettings {
    fn default() -> Self {
        Self {
            ban_ttl: DEFAULT_BAN_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            whitelist: Vec::new(),
        }
    }
}

impl From<&ProtectionConfig> for ProtectionSettings {
    fn from(config: &ProtectionConfig) -> Self {
        Self {
            ban_ttl: Duration::from_secs(config.ban_ttl_secs),
            sweep_interval: Duration::from_millis(config.sweep_interval_ms),
            queue_capacity: config.queue_capacity,
            whitelist: config.whitelist.clone(),
        }
        .normalized()
    }
}
