//! Lifecycle of the protection manager.
use std::sync::Arc;

use gatewarden_detection::AlertSource;
use gatewarden_prevention::FirewallBackend;
use gatewarden_telemetry::MetricsRecorder;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use super::error::EngineError;
use super::event_loop::EventLoop;
use super::handle::ProtectionHandle;
use super::settings::ProtectionSettings;
use super::state::ProtectionState;

/// Assembles a [`ProtectionManager`]. A backend and an alert source are required.
#[derive(Default)]
pub struct ProtectionManagerBuilder {
    settings: ProtectionSettings,
    backend: Option<Arc<dyn FirewallBackend>>,
    alert_source: Option<Arc<dyn AlertSource>>,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl ProtectionManagerBuilder {
    pub fn settings(mut self, settings: ProtectionSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn backend(mut self, backend: Arc<dyn FirewallBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn alert_source(mut self, source: Arc<dyn AlertSource>) -> Self {
        self.alert_source = Some(source);
        self
    }

    /// Share an existing recorder, e.g. one already exported by the caller.
    pub fn metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn build(self) -> Result<ProtectionManager, EngineError> {
        let backend = self
            .backend
            .ok_or_else(|| EngineError::Config("firewall backend is required".into()))?;
        let alert_source = self
            .alert_source
            .ok_or_else(|| EngineError::Config("alert source is required".into()))?;
        let alerts = alert_source.channel().ok_or_else(|| {
            EngineError::Config("alert source channel already taken".into())
        })?;
        let metrics = match self.metrics {
            Some(metrics) => metrics,
            None => Arc::new(MetricsRecorder::new()?),
        };

        let settings = self.settings.normalized();
        let state = Arc::new(RwLock::new(ProtectionState::default()));
        let (handle, requests) = ProtectionHandle::new(
            settings.queue_capacity,
            state.clone(),
            settings.ban_ttl,
            metrics.clone(),
        );
        debug!(?settings, "Protection manager built");

        let event_loop = EventLoop::new(backend, state, settings, metrics, requests, alerts);
        Ok(ProtectionManager {
            handle,
            event_loop: Mutex::new(Some(event_loop)),
            alert_source,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }
}

/// Owns the event loop task and the alert source it consumes.
///
/// Requests go through [`ProtectionHandle`]; this type only starts and
/// stops things. A stopped manager cannot be started again.
pub struct ProtectionManager {
    handle: ProtectionHandle,
    event_loop: Mutex<Option<EventLoop>>,
    alert_source: Arc<dyn AlertSource>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ProtectionManager {
    pub fn builder() -> ProtectionManagerBuilder {
        ProtectionManagerBuilder::default()
    }

    pub fn handle(&self) -> ProtectionHandle {
        self.handle.clone()
    }

    /// Start the alert source, reconcile with the backend, then spawn the
    /// event loop. Requests queued before this call are processed once the
    /// loop runs.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), EngineError> {
        let mut event_loop = self
            .event_loop
            .lock()
            .take()
            .ok_or(EngineError::AlreadyStarted)?;

        self.alert_source.start_scan();
        event_loop.reconcile().await;

        let task = tokio::spawn(event_loop.run(self.cancel.clone()));
        *self.task.lock() = Some(task);
        info!("Protection manager started");
        Ok(())
    }

    /// Stop the alert source, lift every ban and wait for the loop to exit.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        self.alert_source.stop_scan();
        self.cancel.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Protection event loop panicked: {e}");
            }
        }
        info!("Protection manager stopped");
    }
}

impl Drop for ProtectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
