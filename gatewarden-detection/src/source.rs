//! ## gatewarden-detection::source
//! **Resilient tail of an append-only JSON alert log**
//!
//! ### Expectations:
//! - Never terminates on its own; only `stop_scan` ends the task
//! - A missing or unreadable log is retried forever
//! - Only records appended after `start_scan` are considered
//! - A log renamed away (rotation) is followed to its replacement, which is
//!   read from the start
//! - Publishing never blocks: a full queue drops the newest address
//!
//! ### State machine:
//! `Idle -> Scanning -> Stopped`. A stopped source cannot be restarted.

use std::fs::Metadata;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gatewarden_telemetry::{MetricsRecorder, RequestQueue};
use parking_lot::Mutex;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::alert::{default_filter, Alert, AlertFilter};

const DEFAULT_BUFFER_SIZE: usize = 128;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);
const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Producer of candidate addresses consumed by the protection manager.
pub trait AlertSource: Send + Sync {
    fn start_scan(&self);
    fn stop_scan(&self);

    /// Receiving half of the outbound queue. Handed out at most once.
    fn channel(&self) -> Option<mpsc::Receiver<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Stopped,
}

/// Tails a Snort JSON alert log.
pub struct LogAlertSource {
    log_path: PathBuf,
    poll_interval: Duration,
    retry_interval: Duration,
    filter: AlertFilter,
    metrics: Option<Arc<MetricsRecorder>>,
    sender: Mutex<Option<mpsc::Sender<String>>>,
    receiver: Mutex<Option<mpsc::Receiver<String>>>,
    state: Mutex<ScanState>,
    cancel: CancellationToken,
}

impl LogAlertSource {
    /// `buffer_size == 0` selects the default; `None` selects [`default_filter`].
    pub fn new(log_path: impl Into<PathBuf>, buffer_size: usize, filter: Option<AlertFilter>) -> Self {
        let buffer_size = if buffer_size == 0 {
            DEFAULT_BUFFER_SIZE
        } else {
            buffer_size
        };
        let (sender, receiver) = mpsc::channel(buffer_size);

        Self {
            log_path: log_path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            filter: filter.unwrap_or_else(|| Arc::new(default_filter)),
            metrics: None,
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            state: Mutex::new(ScanState::Idle),
            cancel: CancellationToken::new(),
        }
    }

    /// Back-off after end-of-file (`poll`) and after open/read failures (`retry`).
    pub fn with_intervals(mut self, poll: Duration, retry: Duration) -> Self {
        if !poll.is_zero() {
            self.poll_interval = poll;
        }
        if !retry.is_zero() {
            self.retry_interval = retry;
        }
        self
    }

    /// Count overflow drops under `gatewarden_dropped_requests_total{queue="alerts"}`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock()
    }
}

impl AlertSource for LogAlertSource {
    #[instrument(skip(self), fields(path = %self.log_path.display()))]
    fn start_scan(&self) {
        if self.log_path.as_os_str().is_empty() {
            info!("No alert log configured; alert source stays idle");
            return;
        }

        let mut state = self.state.lock();
        if *state != ScanState::Idle {
            warn!(state = ?*state, "Alert source already started");
            return;
        }
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        *state = ScanState::Scanning;

        let tailer = Tailer {
            path: self.log_path.clone(),
            poll_interval: self.poll_interval,
            retry_interval: self.retry_interval,
            filter: self.filter.clone(),
            metrics: self.metrics.clone(),
            sender,
            cancel: self.cancel.clone(),
        };
        info!("Start scanning alert log");
        tokio::spawn(tailer.run());
    }

    fn stop_scan(&self) {
        let mut state = self.state.lock();
        if *state == ScanState::Scanning {
            info!(path = %self.log_path.display(), "Stop scanning alert log");
        }
        *state = ScanState::Stopped;
        self.sender.lock().take();
        self.cancel.cancel();
    }

    fn channel(&self) -> Option<mpsc::Receiver<String>> {
        self.receiver.lock().take()
    }
}

impl Drop for LogAlertSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State owned by the scanning task.
struct Tailer {
    path: PathBuf,
    poll_interval: Duration,
    retry_interval: Duration,
    filter: AlertFilter,
    metrics: Option<Arc<MetricsRecorder>>,
    sender: mpsc::Sender<String>,
    cancel: CancellationToken,
}

enum Follow {
    Rotated,
    Done,
}

/// Whether two metadata records describe the same file.
#[cfg(unix)]
fn same_file(a: &Metadata, b: &Metadata) -> bool {
    use std::os::unix::fs::MetadataExt;
    a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(_a: &Metadata, _b: &Metadata) -> bool {
    true
}

impl Tailer {
    /// Sleep for `duration`; `false` if cancelled meanwhile.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = sleep(duration) => true,
        }
    }

    async fn open(&self) -> Option<File> {
        let mut reported = false;
        loop {
            match File::open(&self.path).await {
                Ok(file) => return Some(file),
                Err(e) => {
                    if !reported {
                        warn!(path = %self.path.display(), "Alert log unavailable, retrying: {e}");
                        reported = true;
                    } else {
                        debug!(path = %self.path.display(), "Alert log still unavailable: {e}");
                    }
                }
            }
            if !self.pause(self.retry_interval).await {
                return None;
            }
        }
    }

    async fn run(self) {
        let mut from_start = false;
        while let Some(file) = self.open().await {
            info!(path = %self.path.display(), "Opened alert log");
            match self.follow(file, from_start).await {
                Follow::Rotated => {
                    info!(path = %self.path.display(), "Alert log rotated, reopening");
                    from_start = true;
                }
                Follow::Done => break,
            }
        }
        debug!(path = %self.path.display(), "Alert tailer exited");
    }

    /// `true` if `path` no longer names the file being read.
    async fn rotated(&self, file: &File) -> bool {
        let Ok(open) = file.metadata().await else {
            return false;
        };
        match tokio::fs::metadata(&self.path).await {
            Ok(current) => !same_file(&open, &current),
            Err(_) => true,
        }
    }

    async fn follow(&self, file: File, from_start: bool) -> Follow {
        let mut reader = BufReader::new(file);
        let mut offset = if from_start {
            0
        } else {
            match reader.seek(SeekFrom::End(0)).await {
                Ok(end) => end,
                Err(e) => {
                    warn!("Failed to seek to end of alert log: {e}");
                    0
                }
            }
        };
        let mut line = Vec::with_capacity(512);

        while !self.cancel.is_cancelled() {
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => {
                    if let Ok(meta) = reader.get_ref().metadata().await {
                        if meta.len() < offset {
                            info!(path = %self.path.display(), "Alert log truncated, rewinding");
                            match reader.seek(SeekFrom::Start(0)).await {
                                Ok(_) => {
                                    offset = 0;
                                    line.clear();
                                    continue;
                                }
                                Err(e) => warn!("Failed to rewind alert log: {e}"),
                            }
                        }
                    }
                    if self.rotated(reader.get_ref()).await {
                        return Follow::Rotated;
                    }
                    if !self.pause(self.poll_interval).await {
                        break;
                    }
                }
                Ok(n) => {
                    offset += n as u64;
                    if line.last() != Some(&b'\n') {
                        // Writer has not finished this record yet.
                        continue;
                    }
                    let keep_going = self.publish(&line);
                    line.clear();
                    if !keep_going {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Alert log read error: {e}");
                    if !self.pause(self.retry_interval).await {
                        break;
                    }
                }
            }
        }
        Follow::Done
    }

    /// Returns `false` once the consumer has gone away.
    fn publish(&self, line: &[u8]) -> bool {
        let Some(alert) = Alert::parse(line) else {
            trace!("Skipping unparsable alert line");
            return true;
        };
        let Some(ip) = (self.filter)(&alert) else {
            return true;
        };
        if ip.is_empty() {
            return true;
        }

        match self.sender.try_send(ip) {
            Ok(()) => true,
            Err(TrySendError::Full(ip)) => {
                if let Some(metrics) = &self.metrics {
                    metrics.inc_dropped(RequestQueue::Alerts);
                }
                warn!(%ip, "Drop alert address: channel full");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Alert consumer closed");
                false
            }
        }
    }
}
