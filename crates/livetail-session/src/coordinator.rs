//! Host-facing entry points: start, refocus and stop tail sessions.
//!
//! The coordinator owns the registry and spawns, per session:
//! - a pump task running the [`Pipeline`] until the stream ends or the
//!   session is cancelled,
//! - a ticker refreshing the elapsed-time status.
//!
//! Every way a session can end (explicit stop, its views closing, the stream
//! ending, shutdown) converges on the same idempotent teardown.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use livetail_core::TailSettings;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::document::SharedDocument;
use crate::error::TailError;
use crate::event::{TailEvent, TailEventKind, TailEventSink};
use crate::key::{ResourceKey, SessionConfiguration};
use crate::lifecycle::{SessionState, StopReason};
use crate::pipeline::{lock_document, Pipeline, PipelineReport};
use crate::registry::SessionRegistry;
use crate::session::{SessionSnapshot, TailSession};
use crate::transport::{FrameStream, TransportConnector};
use crate::workspace::Workspace;

/// Shortest elapsed-time refresh period.
pub const MIN_STATUS_REFRESH: Duration = Duration::from_millis(10);

/// Result of a tailing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new session was started.
    Started(ResourceKey),
    /// A session for the key was already running; its document was focused.
    Refocused(ResourceKey),
}

impl StartOutcome {
    pub fn key(&self) -> &ResourceKey {
        match self {
            Self::Started(key) | Self::Refocused(key) => key,
        }
    }
}

/// Per-coordinator session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    pub max_lines: usize,
    pub status_refresh: Duration,
    pub clear_on_stop: bool,
}

impl From<&TailSettings> for CoordinatorSettings {
    fn from(settings: &TailSettings) -> Self {
        Self {
            max_lines: settings.max_lines,
            status_refresh: settings.status_refresh_interval(),
            clear_on_stop: settings.clear_on_stop,
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from(&TailSettings::default())
    }
}

/// State shared with spawned tasks.
struct Shared {
    registry: SessionRegistry,
    workspace: Arc<dyn Workspace>,
    events: Arc<dyn TailEventSink>,
    clear_on_stop: bool,
}

impl Shared {
    fn record(&self, key: &ResourceKey, kind: TailEventKind) {
        self.events.record(TailEvent::new(key.clone(), kind));
    }

    /// Stop `session` and drop its registry entry.
    ///
    /// Only the first teardown of a session emits `Stopped` and clears the
    /// document; the entry is removed only if it still belongs to `session`.
    fn teardown(&self, session: &TailSession, reason: StopReason) -> bool {
        let stopped = session.stop();
        self.registry
            .remove_instance(session.key(), session.instance_id());
        if !stopped {
            return false;
        }

        if self.clear_on_stop {
            if let Some(document) = self.workspace.document(session.key()) {
                lock_document(&document).clear();
            }
        }
        tracing::info!(key = %session.key(), reason = %reason, "tail session torn down");
        self.record(session.key(), TailEventKind::Stopped(reason));
        true
    }

    fn stop_key(&self, key: &ResourceKey, reason: StopReason) -> bool {
        match self.registry.lookup(key) {
            Ok(session) => self.teardown(&session, reason),
            Err(_) => false,
        }
    }

    fn stop_unviewed(&self) -> Vec<ResourceKey> {
        let mut stopped = Vec::new();
        for key in self.registry.keys() {
            let Ok(session) = self.registry.lookup(&key) else {
                continue;
            };
            // Starting sessions have no document yet.
            if session.state() != SessionState::Running
                || self.workspace.open_view_count(&key) > 0
            {
                continue;
            }
            if self.teardown(&session, StopReason::ViewsClosed) {
                stopped.push(key);
            }
        }
        stopped
    }
}

/// Starts and stops live tail sessions against a workspace.
pub struct TailCoordinator {
    shared: Arc<Shared>,
    connector: Arc<dyn TransportConnector>,
    settings: CoordinatorSettings,
    pumps: Mutex<BTreeMap<ResourceKey, JoinHandle<PipelineReport>>>,
    /// Cancelled when the coordinator is dropped; ends the view watcher.
    shutdown: CancellationToken,
}

impl TailCoordinator {
    pub fn new(
        connector: Arc<dyn TransportConnector>,
        workspace: Arc<dyn Workspace>,
        events: Arc<dyn TailEventSink>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self::with_registry(
            SessionRegistry::new(),
            connector,
            workspace,
            events,
            settings,
        )
    }

    pub fn with_registry(
        registry: SessionRegistry,
        connector: Arc<dyn TransportConnector>,
        workspace: Arc<dyn Workspace>,
        events: Arc<dyn TailEventSink>,
        settings: CoordinatorSettings,
    ) -> Self {
        let settings = CoordinatorSettings {
            max_lines: settings.max_lines.max(1),
            status_refresh: settings.status_refresh.max(MIN_STATUS_REFRESH),
            clear_on_stop: settings.clear_on_stop,
        };
        Self {
            shared: Arc::new(Shared {
                registry,
                workspace,
                events,
                clear_on_stop: settings.clear_on_stop,
            }),
            connector,
            settings,
            pumps: Mutex::new(BTreeMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.shared.registry
    }

    pub fn settings(&self) -> CoordinatorSettings {
        self.settings
    }

    /// Start tailing `config`, or focus the document of the session already
    /// tailing the same key.
    ///
    /// On failure nothing is registered and no stream stays open.
    pub async fn start_tailing(
        &self,
        config: SessionConfiguration,
    ) -> Result<StartOutcome, TailError> {
        let key = config.key();
        match self.try_start(config, &key).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "failed to start tailing");
                self.shared
                    .record(&key, TailEventKind::StartFailed(err.to_string()));
                Err(err)
            }
        }
    }

    async fn try_start(
        &self,
        config: SessionConfiguration,
        key: &ResourceKey,
    ) -> Result<StartOutcome, TailError> {
        config.validate()?;
        if self.shared.registry.contains(key) {
            return Ok(self.refocus(key));
        }

        let transport = self.connector.connect(&config)?;
        let session = Arc::new(TailSession::new(
            config,
            self.settings.max_lines,
            transport,
        )?);

        // Reserve the key before the open is awaited, so a concurrent request
        // for it refocuses instead of opening a second stream.
        if let Err(err) = self.shared.registry.register(Arc::clone(&session)) {
            session.stop();
            return match err {
                TailError::AlreadyExists { .. } => Ok(self.refocus(key)),
                other => Err(other),
            };
        }

        let stream = match session.start().await {
            Ok(stream) => stream,
            Err(err) => {
                // A failed start has already stopped the session.
                self.shared
                    .registry
                    .remove_instance(key, session.instance_id());
                return Err(err);
            }
        };

        let document = match self.shared.workspace.open_document(key) {
            Ok(document) => document,
            Err(err) => {
                session.stop();
                self.shared
                    .registry
                    .remove_instance(key, session.instance_id());
                return Err(err);
            }
        };

        self.shared.record(key, TailEventKind::Started);
        self.spawn_ticker(&session);
        let pump = self.spawn_pump(session, stream, document);
        let mut pumps = lock_pumps(&self.pumps);
        // Finished pumps are only kept until the next start.
        pumps.retain(|_, handle| !handle.is_finished());
        pumps.insert(key.clone(), pump);
        Ok(StartOutcome::Started(key.clone()))
    }

    fn refocus(&self, key: &ResourceKey) -> StartOutcome {
        if !self.shared.workspace.focus_document(key) {
            tracing::debug!(key = %key, "running session has no document to focus");
        }
        self.shared.record(key, TailEventKind::Refocused);
        StartOutcome::Refocused(key.clone())
    }

    fn spawn_pump(
        &self,
        session: Arc<TailSession>,
        mut stream: Box<dyn FrameStream>,
        document: SharedDocument,
    ) -> JoinHandle<PipelineReport> {
        let shared = Arc::clone(&self.shared);
        let pipeline = Pipeline::new(
            session.key().clone(),
            document,
            session.max_lines(),
            Arc::clone(&shared.events),
        );
        let cancel = session.cancel_token();
        tokio::spawn(async move {
            let report = pipeline.run(stream.as_mut(), &cancel).await;
            // No-op when the session was already stopped by someone else.
            shared.teardown(&session, StopReason::StreamEnded);
            report
        })
    }

    fn spawn_ticker(&self, session: &Arc<TailSession>) {
        let shared = Arc::clone(&self.shared);
        let session = Arc::clone(session);
        let cancel = session.cancel_token();
        let period = self.settings.status_refresh;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        shared.record(session.key(), TailEventKind::Elapsed(session.duration()));
                    }
                }
            }
        });
    }

    /// Stop the session for `key`. Returns `false` if none was running.
    pub fn stop_tailing(&self, key: &ResourceKey) -> bool {
        self.shared.stop_key(key, StopReason::Explicit)
    }

    pub fn is_active(&self, key: &ResourceKey) -> bool {
        self.shared.registry.contains(key)
    }

    pub fn active_sessions(&self) -> Vec<SessionSnapshot> {
        self.shared.registry.snapshots()
    }

    /// Stop every running session. Returns how many were stopped.
    pub fn stop_all(&self) -> usize {
        self.shared
            .registry
            .keys()
            .iter()
            .filter(|key| self.shared.stop_key(key, StopReason::Shutdown))
            .count()
    }

    /// Empty the document of a running session.
    pub fn clear_document(&self, key: &ResourceKey) -> Result<(), TailError> {
        if !self.shared.registry.contains(key) {
            return Err(TailError::NotFound {
                key: key.to_string(),
            });
        }
        let document = self
            .shared
            .workspace
            .document(key)
            .ok_or_else(|| TailError::Document {
                message: format!("no document open for {key}"),
            })?;
        lock_document(&document).clear();
        self.shared.record(key, TailEventKind::Cleared);
        Ok(())
    }

    /// Stop every session whose document is no longer shown in any view.
    pub fn on_view_set_changed(&self) -> Vec<ResourceKey> {
        self.shared.stop_unviewed()
    }

    /// Run [`Self::on_view_set_changed`] on every workspace view event.
    ///
    /// Must be called from within a tokio runtime. The task ends when the
    /// coordinator is dropped or the workspace closes its event channel.
    pub fn watch_views(&self) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let shutdown = self.shutdown.clone();
        let mut rx = shared.workspace.subscribe();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    received = rx.recv() => received,
                };
                match received {
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "view watcher lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
                let stopped = shared.stop_unviewed();
                if !stopped.is_empty() {
                    tracing::debug!(count = stopped.len(), "stopped sessions without views");
                }
            }
        })
    }

    /// Wait for the pump of the latest session for `key` to finish.
    ///
    /// Returns `None` if no pump is tracked for `key` or it panicked. The
    /// handle of a finished pump is dropped by the next `start_tailing`.
    pub async fn wait_for_session(&self, key: &ResourceKey) -> Option<PipelineReport> {
        let handle = lock_pumps(&self.pumps).remove(key)?;
        match handle.await {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::warn!(key = %key, error = %err, "tail pump task failed");
                None
            }
        }
    }
}

impl Drop for TailCoordinator {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.stop_all();
    }
}

fn lock_pumps(
    pumps: &Mutex<BTreeMap<ResourceKey, JoinHandle<PipelineReport>>>,
) -> MutexGuard<'_, BTreeMap<ResourceKey, JoinHandle<PipelineReport>>> {
    match pumps.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
