//! ## gatewarden-telemetry::metrics
//! **Prometheus counters for enforcement activity**
//!
//! The registry is owned by the process; the protection manager and the API
//! layer share one `Arc<MetricsRecorder>`.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Inbound queues whose overflow is counted separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestQueue {
    Add,
    AddPermanent,
    Delete,
    WhitelistAdd,
    WhitelistDelete,
    Alerts,
}

impl RequestQueue {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestQueue::Add => "add",
            RequestQueue::AddPermanent => "add_permanent",
            RequestQueue::Delete => "delete",
            RequestQueue::WhitelistAdd => "whitelist_add",
            RequestQueue::WhitelistDelete => "whitelist_delete",
            RequestQueue::Alerts => "alerts",
        }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    pub registry: Registry,
    pub bans: IntCounter,
    pub unbans: IntCounter,
    pub backend_failures: IntCounter,
    pub unban_failures: IntCounter,
    pub dropped_requests: IntCounterVec,
    pub alerts: IntCounter,
    pub active_bans: IntGauge,
}

impl MetricsRecorder {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let bans = IntCounter::new("gatewarden_bans_total", "Addresses banned")?;
        let unbans = IntCounter::new("gatewarden_unbans_total", "Addresses unbanned")?;
        let backend_failures = IntCounter::new(
            "gatewarden_backend_failures_total",
            "Failed firewall backend calls",
        )?;
        let unban_failures = IntCounter::new(
            "gatewarden_unban_failures_total",
            "Unban attempts refused by the firewall backend",
        )?;
        let dropped_requests = IntCounterVec::new(
            Opts::new(
                "gatewarden_dropped_requests_total",
                "Requests dropped because their queue was full",
            ),
            &["queue"],
        )?;
        let alerts = IntCounter::new(
            "gatewarden_alerts_total",
            "Candidate addresses received from the alert source",
        )?;
        let active_bans = IntGauge::new("gatewarden_active_bans", "Entries in the ban table")?;

        registry.register(Box::new(bans.clone()))?;
        registry.register(Box::new(unbans.clone()))?;
        registry.register(Box::new(backend_failures.clone()))?;
        registry.register(Box::new(unban_failures.clone()))?;
        registry.register(Box::new(dropped_requests.clone()))?;
        registry.register(Box::new(alerts.clone()))?;
        registry.register(Box::new(active_bans.clone()))?;

        Ok(Self {
            registry,
            bans,
            unbans,
            backend_failures,
            unban_failures,
            dropped_requests,
            alerts,
            active_bans,
        })
    }

    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::<u8>::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    #[inline]
    pub fn inc_dropped(&self, queue: RequestQueue) {
        self.dropped_requests
            .with_label_values(&[queue.as_str()])
            .inc();
    }

    #[inline]
    pub fn set_active_bans(&self, count: usize) {
        self.active_bans.set(count as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exposes_registered_series() {
        let metrics = MetricsRecorder::new().unwrap();
        metrics.bans.inc();
        metrics.inc_dropped(RequestQueue::WhitelistAdd);
        metrics.set_active_bans(3);

        let text = metrics.gather_metrics().unwrap();
        assert!(text.contains("gatewarden_bans_total 1"));
        assert!(text.contains("gatewarden_dropped_requests_total{queue=\"whitelist_add\"} 1"));
        assert!(text.contains("gatewarden_active_bans 3"));
    }

    #[test]
    fn recorders_are_independent() {
        let first = MetricsRecorder::new().unwrap();
        let second = MetricsRecorder::new().unwrap();
        first.unbans.inc();
        assert_eq!(second.unbans.get(), 0);
    }
}
