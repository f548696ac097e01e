//! The single consumer behind the protection manager.
//!
//! Every handler runs to completion before the next event is taken, so the
//! table can never see two concurrent decisions about one address. Backend
//! calls are awaited inline; a slow backend delays everything queued behind
//! it. The state lock is never held across an `.await`.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use gatewarden_core::{canonicalize, BanEntry};
use gatewarden_prevention::FirewallBackend;
use gatewarden_telemetry::{EventLogger, MetricsRecorder};
use opentelemetry::KeyValue;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::handle::RequestReceivers;
use super::settings::ProtectionSettings;
use super::state::ProtectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnbanReason {
    Manual,
    Expired,
    Whitelisted,
    Retry,
}

impl fmt::Display for UnbanReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UnbanReason::Manual => "manual",
            UnbanReason::Expired => "expired",
            UnbanReason::Whitelisted => "whitelisted",
            UnbanReason::Retry => "retry",
        })
    }
}

pub(crate) struct EventLoop {
    backend: Arc<dyn FirewallBackend>,
    state: Arc<RwLock<ProtectionState>>,
    settings: ProtectionSettings,
    metrics: Arc<MetricsRecorder>,
    requests: RequestReceivers,
    alerts: mpsc::Receiver<String>,
}

impl EventLoop {
    pub fn new(
        backend: Arc<dyn FirewallBackend>,
        state: Arc<RwLock<ProtectionState>>,
        settings: ProtectionSettings,
        metrics: Arc<MetricsRecorder>,
        requests: RequestReceivers,
        alerts: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            backend,
            state,
            settings,
            metrics,
            requests,
            alerts,
        }
    }

    /// Seed the configured whitelist, then import whatever the backend is
    /// already enforcing as fresh, full-TTL temporary bans.
    pub async fn reconcile(&mut self) {
        {
            let mut state = self.state.write();
            for raw in &self.settings.whitelist {
                match canonicalize(raw) {
                    Ok(ip) => {
                        state.whitelist.insert(ip);
                    }
                    Err(e) => warn!("Ignore configured whitelist entry: {e}"),
                }
            }
        }

        let listed = match self.backend.list_banned().await {
            Ok(listed) => listed,
            Err(e) => {
                self.metrics.backend_failures.inc();
                error!("Failed to sync from firewall: {e}");
                return;
            }
        };

        let now = Utc::now();
        let mut state = self.state.write();
        let mut imported = 0usize;
        for raw in listed {
            let Ok(ip) = canonicalize(&raw) else {
                debug!(entry = %raw, "Skip unparsable firewall entry");
                continue;
            };
            if state.is_tracked(&ip) {
                continue;
            }
            state
                .bans
                .insert(ip, BanEntry::temporary(now, self.settings.ban_ttl));
            imported += 1;
        }
        self.metrics.set_active_bans(state.bans.len());

        if imported > 0 {
            info!(count = imported, "Synced banned addresses from firewall");
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) {
        let period = self.settings.sweep_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut alerts_open = true;

        info!(
            ttl_secs = self.settings.ban_ttl.as_secs(),
            sweep_ms = period.as_millis() as u64,
            "Protection event loop started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.cleanup_all().await;
                    break;
                }
                Some(ip) = self.requests.add.recv() => self.handle_scan(&ip, false).await,
                Some(ip) = self.requests.add_permanent.recv() => self.handle_scan(&ip, true).await,
                Some(ip) = self.requests.delete.recv() => self.handle_delete(&ip).await,
                Some(ip) = self.requests.whitelist_add.recv() => self.handle_add_whitelist(&ip).await,
                Some(ip) = self.requests.whitelist_delete.recv() => self.handle_delete_whitelist(&ip).await,
                alert = self.alerts.recv(), if alerts_open => match alert {
                    Some(ip) => {
                        self.metrics.alerts.inc();
                        self.handle_scan(&ip, false).await;
                    }
                    None => {
                        alerts_open = false;
                        warn!("Alert feed closed");
                    }
                },
                _ = ticker.tick() => self.handle_expired_sweep().await,
            }
        }

        info!("Protection event loop stopped");
    }

    pub async fn handle_scan(&mut self, raw: &str, permanent: bool) {
        let ip = match canonicalize(raw) {
            Ok(ip) => ip,
            Err(e) => {
                warn!("Ignore ban request: {e}");
                return;
            }
        };

        if self.state.read().is_tracked(&ip) {
            trace!(%ip, "Already banned or whitelisted");
            return;
        }

        if let Err(e) = self.backend.block(&ip).await {
            self.metrics.backend_failures.inc();
            match self.backend.list_banned().await {
                Ok(listed) if listed.iter().any(|b| canonicalize(b).is_ok_and(|b| b == ip)) => {
                    warn!(%ip, "Block reported an error but address is already enforced; syncing: {e}");
                }
                Ok(_) => {
                    error!(%ip, "Block failed: {e}");
                    return;
                }
                Err(list_err) => {
                    error!(%ip, "Block failed ({e}) and verifying firewall state failed: {list_err}");
                    return;
                }
            }
        }

        let entry = if permanent {
            BanEntry::permanent()
        } else {
            BanEntry::temporary(Utc::now(), self.settings.ban_ttl)
        };
        match entry.expire_at {
            Some(at) => info!(%ip, until = %at.to_rfc3339(), "Blocked"),
            None => info!(%ip, "Blocked permanently"),
        }

        {
            let mut state = self.state.write();
            state.bans.insert(ip.clone(), entry);
            self.metrics.set_active_bans(state.bans.len());
        }
        self.metrics.bans.inc();

        EventLogger::log_event(
            "ban",
            vec![KeyValue::new("ip", ip), KeyValue::new("permanent", permanent)],
        )
        .await;
    }

    pub async fn handle_delete(&mut self, raw: &str) {
        let Ok(ip) = canonicalize(raw) else {
            warn!(entry = %raw, "Ignore unban request for invalid address");
            return;
        };
        if !self.state.read().bans.contains_key(&ip) {
            trace!(%ip, "Not banned");
            return;
        }
        self.unban(&ip, UnbanReason::Manual).await;
    }

    /// Unban every non-permanent entry past its expiry, and retry every
    /// entry whose earlier unban was refused.
    pub async fn handle_expired_sweep(&mut self) {
        let now = Utc::now();
        let due: Vec<(String, bool)> = self
            .state
            .read()
            .bans
            .iter()
            .filter(|(_, entry)| entry.is_due(now))
            .map(|(ip, entry)| (ip.clone(), entry.pending_unban))
            .collect();

        for (ip, pending) in due {
            let reason = if pending {
                UnbanReason::Retry
            } else {
                UnbanReason::Expired
            };
            self.unban(&ip, reason).await;
        }
    }

    /// Whitelist membership is recorded unconditionally. If the ban cannot be
    /// lifted right away, the entry stays flagged and the sweep finishes the
    /// eviction.
    pub async fn handle_add_whitelist(&mut self, raw: &str) {
        let Ok(ip) = canonicalize(raw) else {
            warn!(entry = %raw, "Ignore whitelist request for invalid address");
            return;
        };

        let banned = {
            let mut state = self.state.write();
            if state.whitelist.insert(ip.clone()) {
                info!(%ip, "Added to whitelist");
            }
            state.bans.contains_key(&ip)
        };

        if banned {
            self.unban(&ip, UnbanReason::Whitelisted).await;
        }
    }

    pub async fn handle_delete_whitelist(&mut self, raw: &str) {
        let Ok(ip) = canonicalize(raw) else {
            warn!(entry = %raw, "Ignore whitelist removal for invalid address");
            return;
        };
        if self.state.write().whitelist.remove(&ip) {
            info!(%ip, "Removed from whitelist");
        }
    }

    /// Returns `true` if the entry was removed.
    async fn unban(&mut self, ip: &str, reason: UnbanReason) -> bool {
        match self.backend.unblock(ip).await {
            Ok(()) => {
                {
                    let mut state = self.state.write();
                    state.bans.remove(ip);
                    self.metrics.set_active_bans(state.bans.len());
                }
                self.metrics.unbans.inc();
                info!(%ip, %reason, "Unblocked");
                EventLogger::log_event(
                    "unban",
                    vec![
                        KeyValue::new("ip", ip.to_string()),
                        KeyValue::new("reason", reason.to_string()),
                    ],
                )
                .await;
                true
            }
            Err(e) => {
                self.metrics.backend_failures.inc();
                self.metrics.unban_failures.inc();
                let failures = self
                    .state
                    .write()
                    .bans
                    .get_mut(ip)
                    .map(|entry| {
                        entry.record_unban_failure();
                        entry.unban_failures
                    })
                    .unwrap_or_default();
                error!(%ip, %reason, failures, "Unblock failed, retrying on next sweep: {e}");
                false
            }
        }
    }

    /// Lift every ban before the loop exits. The table ends up empty even if
    /// some backend calls fail.
    async fn cleanup_all(&mut self) {
        let ips: Vec<String> = self.state.read().bans.keys().cloned().collect();
        let mut failed = 0usize;

        for ip in &ips {
            match self.backend.unblock(ip).await {
                Ok(()) => {
                    self.metrics.unbans.inc();
                    debug!(%ip, "Unblocked (cleanup)");
                }
                Err(e) => {
                    failed += 1;
                    self.metrics.backend_failures.inc();
                    error!(%ip, "Unblock failed during cleanup: {e}");
                }
            }
        }

        self.state.write().bans.clear();
        self.metrics.set_active_bans(0);
        info!(total = ips.len(), failed, "Cleanup complete");
    }
}
