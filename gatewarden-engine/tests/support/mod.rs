#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gatewarden_detection::AlertSource;
use gatewarden_engine::{ProtectionHandle, ProtectionManager, ProtectionSettings};
use gatewarden_prevention::{FirewallBackend, FirewallError};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Backend that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingFirewall {
    banned: Mutex<BTreeSet<String>>,
    pub blocks: Mutex<Vec<String>>,
    pub unblocks: Mutex<Vec<String>>,
    pub fail_block: AtomicBool,
    pub fail_unblock: AtomicBool,
    pub fail_list: AtomicBool,
}

impl RecordingFirewall {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn preloaded(ips: &[&str]) -> Arc<Self> {
        let fw = Self::default();
        fw.banned
            .lock()
            .extend(ips.iter().map(|ip| ip.to_string()));
        Arc::new(fw)
    }

    /// Put `ip` into the set without going through `block`.
    pub fn inject(&self, ip: &str) {
        self.banned.lock().insert(ip.to_string());
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.banned.lock().contains(ip)
    }

    pub fn banned(&self) -> Vec<String> {
        self.banned.lock().iter().cloned().collect()
    }

    pub fn block_calls(&self, ip: &str) -> usize {
        self.blocks.lock().iter().filter(|b| *b == ip).count()
    }

    pub fn unblock_calls(&self, ip: &str) -> usize {
        self.unblocks.lock().iter().filter(|b| *b == ip).count()
    }

    pub fn set_fail_block(&self, fail: bool) {
        self.fail_block.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_unblock(&self, fail: bool) {
        self.fail_unblock.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }
}

fn injected(action: &str) -> FirewallError {
    FirewallError::CommandFailed {
        action: action.to_string(),
        output: "injected failure".to_string(),
    }
}

#[async_trait]
impl FirewallBackend for RecordingFirewall {
    async fn block(&self, ip: &str) -> Result<(), FirewallError> {
        self.blocks.lock().push(ip.to_string());
        if self.fail_block.load(Ordering::SeqCst) {
            return Err(injected("add element"));
        }
        self.banned.lock().insert(ip.to_string());
        Ok(())
    }

    async fn unblock(&self, ip: &str) -> Result<(), FirewallError> {
        self.unblocks.lock().push(ip.to_string());
        if self.fail_unblock.load(Ordering::SeqCst) {
            return Err(injected("delete element"));
        }
        if self.banned.lock().remove(ip) {
            Ok(())
        } else {
            Err(FirewallError::NotPresent(ip.to_string()))
        }
    }

    async fn list_banned(&self) -> Result<Vec<String>, FirewallError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(injected("list set"));
        }
        Ok(self.banned())
    }
}

/// Alert source whose feed is driven by the test.
pub struct ChannelAlertSource {
    sender: mpsc::Sender<String>,
    receiver: Mutex<Option<mpsc::Receiver<String>>>,
    pub started: AtomicBool,
    pub stopped: AtomicBool,
}

impl ChannelAlertSource {
    pub fn new() -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(64);
        Arc::new(Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            started: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    pub async fn emit(&self, ip: &str) {
        self.sender.send(ip.to_string()).await.unwrap();
    }
}

impl AlertSource for ChannelAlertSource {
    fn start_scan(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    fn stop_scan(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn channel(&self) -> Option<mpsc::Receiver<String>> {
        self.receiver.lock().take()
    }
}

pub fn settings(ttl: Duration, sweep: Duration) -> ProtectionSettings {
    ProtectionSettings {
        ban_ttl: ttl,
        sweep_interval: sweep,
        queue_capacity: 16,
        whitelist: Vec::new(),
    }
}

pub fn manager(
    settings: ProtectionSettings,
    backend: Arc<RecordingFirewall>,
    source: Arc<ChannelAlertSource>,
) -> ProtectionManager {
    ProtectionManager::builder()
        .settings(settings)
        .backend(backend)
        .alert_source(source)
        .build()
        .unwrap()
}

/// Poll `cond` every 10ms until it holds or `timeout` elapses.
pub async fn wait_until<F>(timeout: Duration, mut cond: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn is_banned(handle: &ProtectionHandle, ip: &str) -> bool {
    handle.snapshot_bans().iter().any(|b| b.ip == ip)
}
