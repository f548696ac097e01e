//! ## gatewarden-detection::alert
//! **One JSON alert record and the filters applied to it**
//!
//! Accepts both the Snort 3 `alert_json` field names (`src_addr`, `dst_addr`)
//! and the eve-style ones (`src_ip`, `dest_ip`). Only string values are read;
//! every other field, whatever its type, is ignored.

use std::sync::Arc;

use serde_json::{Map, Value};

const SOURCE_KEYS: &[&str] = &["src_ip", "src_addr"];
const DEST_KEYS: &[&str] = &["dest_ip", "dst_addr", "dest_addr"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alert {
    pub event_type: Option<String>,
    pub src_ip: Option<String>,
    pub dest_ip: Option<String>,
    pub msg: Option<String>,
    pub proto: Option<String>,
}

/// First key holding a non-blank string.
fn text(record: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| record.get(*key).and_then(Value::as_str))
        .find(|value| !value.trim().is_empty())
        .map(str::to_string)
}

impl Alert {
    /// Parse one log line. Anything that is not a JSON object yields `None`.
    pub fn parse(line: &[u8]) -> Option<Self> {
        let Value::Object(record) = serde_json::from_slice(line).ok()? else {
            return None;
        };

        Some(Self {
            event_type: text(&record, &["event_type"]),
            src_ip: text(&record, SOURCE_KEYS),
            dest_ip: text(&record, DEST_KEYS),
            msg: text(&record, &["msg"]),
            proto: text(&record, &["proto"]),
        })
    }

    /// Records without an `event_type` count as alerts.
    pub fn is_alert(&self) -> bool {
        self.event_type.as_deref().map_or(true, |t| t == "alert")
    }
}

/// Maps a record to the address that should be banned, if any.
pub type AlertFilter = Arc<dyn Fn(&Alert) -> Option<String> + Send + Sync>;

fn trimmed(addr: Option<&str>) -> Option<String> {
    addr.map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// The record's source address, provided it is non-empty and the record is
/// an alert.
pub fn default_filter(alert: &Alert) -> Option<String> {
    if !alert.is_alert() {
        return None;
    }
    trimmed(alert.src_ip.as_deref())
}

/// The record's destination address. Used when the protected side is the
/// attacker, e.g. a LAN host talking to a known-bad server.
pub fn dest_filter(alert: &Alert) -> Option<String> {
    if !alert.is_alert() {
        return None;
    }
    trimmed(alert.dest_ip.as_deref())
}
