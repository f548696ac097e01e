//! Ban-table entries and the snapshot view handed to API consumers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One enforced ban, keyed externally by canonical address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanEntry {
    /// `None` for permanent bans.
    pub expire_at: Option<DateTime<Utc>>,
    /// An unban was requested but the backend refused it; the sweep retries.
    pub pending_unban: bool,
    pub unban_failures: u32,
}

impl BanEntry {
    /// A ban expiring `ttl` after `now`.
    pub fn temporary(now: DateTime<Utc>, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        Self {
            expire_at: Some(now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC)),
            pending_unban: false,
            unban_failures: 0,
        }
    }

    pub fn permanent() -> Self {
        Self {
            expire_at: None,
            pending_unban: false,
            unban_failures: 0,
        }
    }

    #[inline]
    pub fn is_permanent(&self) -> bool {
        self.expire_at.is_none()
    }

    /// Permanent entries never expire.
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expire_at, Some(at) if now > at)
    }

    /// Whether the expiry sweep should attempt an unban for this entry.
    #[inline]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.pending_unban || self.is_expired(now)
    }

    pub fn record_unban_failure(&mut self) {
        self.pending_unban = true;
        self.unban_failures = self.unban_failures.saturating_add(1);
    }

    pub fn view(&self, ip: &str, original_ttl: Duration) -> BannedIpView {
        BannedIpView {
            ip: ip.to_string(),
            expire_at: self.expire_at,
            is_permanent: self.is_permanent(),
            original_ttl_secs: original_ttl.as_secs(),
            pending_unban: self.pending_unban,
            unban_failures: self.unban_failures,
        }
    }
}

/// Read-only projection of a [`BanEntry`], serialisable for the API layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BannedIpView {
    pub ip: String,
    pub expire_at: Option<DateTime<Utc>>,
    pub is_permanent: bool,
    pub original_ttl_secs: u64,
    #[serde(default)]
    pub pending_unban: bool,
    #[serde(default)]
    pub unban_failures: u32,
}
