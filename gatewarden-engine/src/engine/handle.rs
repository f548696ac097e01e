//! Caller-facing surface of the protection manager.
//!
//! Every mutating call validates its address, then hands it to a bounded
//! queue with `try_send`. Nothing here ever waits on the event loop.

use std::sync::Arc;
use std::time::Duration;

use gatewarden_core::{canonicalize, BannedIpView};
use gatewarden_telemetry::{MetricsRecorder, RequestQueue};
use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::state::ProtectionState;

pub(crate) struct RequestReceivers {
    pub add: mpsc::Receiver<String>,
    pub add_permanent: mpsc::Receiver<String>,
    pub delete: mpsc::Receiver<String>,
    pub whitelist_add: mpsc::Receiver<String>,
    pub whitelist_delete: mpsc::Receiver<String>,
}

#[derive(Clone)]
struct RequestSenders {
    add: mpsc::Sender<String>,
    add_permanent: mpsc::Sender<String>,
    delete: mpsc::Sender<String>,
    whitelist_add: mpsc::Sender<String>,
    whitelist_delete: mpsc::Sender<String>,
}

/// Cloneable handle used by the API layer.
#[derive(Clone)]
pub struct ProtectionHandle {
    senders: RequestSenders,
    state: Arc<RwLock<ProtectionState>>,
    ban_ttl: Duration,
    metrics: Arc<MetricsRecorder>,
}

impl ProtectionHandle {
    pub(crate) fn new(
        capacity: usize,
        state: Arc<RwLock<ProtectionState>>,
        ban_ttl: Duration,
        metrics: Arc<MetricsRecorder>,
    ) -> (Self, RequestReceivers) {
        let (add, add_rx) = mpsc::channel(capacity);
        let (add_permanent, add_permanent_rx) = mpsc::channel(capacity);
        let (delete, delete_rx) = mpsc::channel(capacity);
        let (whitelist_add, whitelist_add_rx) = mpsc::channel(capacity);
        let (whitelist_delete, whitelist_delete_rx) = mpsc::channel(capacity);

        let handle = Self {
            senders: RequestSenders {
                add,
                add_permanent,
                delete,
                whitelist_add,
                whitelist_delete,
            },
            state,
            ban_ttl,
            metrics,
        };
        let receivers = RequestReceivers {
            add: add_rx,
            add_permanent: add_permanent_rx,
            delete: delete_rx,
            whitelist_add: whitelist_add_rx,
            whitelist_delete: whitelist_delete_rx,
        };
        (handle, receivers)
    }

    fn enqueue(&self, sender: &mpsc::Sender<String>, queue: RequestQueue, raw: &str) {
        let ip = match canonicalize(raw) {
            Ok(ip) => ip,
            Err(e) => {
                warn!(queue = queue.as_str(), "Ignore request: {e}");
                return;
            }
        };

        match sender.try_send(ip) {
            Ok(()) => debug!(queue = queue.as_str(), "Request queued"),
            Err(TrySendError::Full(ip)) => {
                self.metrics.inc_dropped(queue);
                warn!(%ip, queue = queue.as_str(), "Drop request: channel full");
            }
            Err(TrySendError::Closed(ip)) => {
                warn!(%ip, queue = queue.as_str(), "Drop request: protection manager stopped");
            }
        }
    }

    /// Request a ban. Unparsable addresses are logged and dropped.
    pub fn add(&self, ip: &str, is_permanent: bool) {
        if is_permanent {
            self.enqueue(&self.senders.add_permanent, RequestQueue::AddPermanent, ip);
        } else {
            self.enqueue(&self.senders.add, RequestQueue::Add, ip);
        }
    }

    /// Request removal of a ban.
    pub fn delete(&self, ip: &str) {
        self.enqueue(&self.senders.delete, RequestQueue::Delete, ip);
    }

    /// Exempt `ip` from banning and lift any existing ban.
    pub fn add_whitelist(&self, ip: &str) {
        self.enqueue(&self.senders.whitelist_add, RequestQueue::WhitelistAdd, ip);
    }

    /// Remove the exemption. Does not reinstate a ban.
    pub fn delete_whitelist(&self, ip: &str) {
        self.enqueue(&self.senders.whitelist_delete, RequestQueue::WhitelistDelete, ip);
    }

    pub fn snapshot_bans(&self) -> Vec<BannedIpView> {
        let state = self.state.read();
        state
            .bans
            .iter()
            .map(|(ip, entry)| entry.view(ip, self.ban_ttl))
            .collect()
    }

    pub fn snapshot_whitelist(&self) -> Vec<String> {
        self.state.read().whitelist.iter().cloned().collect()
    }

    pub fn ban_ttl(&self) -> Duration {
        self.ban_ttl
    }

    /// Prometheus text exposition of the engine's counters.
    pub fn metrics_text(&self) -> Result<String, prometheus::Error> {
        self.metrics.gather_metrics()
    }
}
