//! The tail session entity.
//!
//! A session owns one transport handle, one cancellation token and its timing
//! state. It is single-use: `start` may succeed once, and once stopped a
//! session stays stopped.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::TailError;
use crate::key::{ResourceKey, SessionConfiguration};
use crate::lifecycle::{validate_transition, SessionState};
use crate::transport::{FrameStream, LogTransport};

struct SessionInner {
    state: SessionState,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    start_instant: Option<Instant>,
    end_instant: Option<Instant>,
}

/// One live tailing subscription.
pub struct TailSession {
    config: SessionConfiguration,
    key: ResourceKey,
    instance_id: String,
    max_lines: usize,
    transport: Box<dyn LogTransport>,
    cancel: CancellationToken,
    inner: Mutex<SessionInner>,
}

/// Read-only view of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub key: ResourceKey,
    pub instance_id: String,
    pub config: SessionConfiguration,
    pub state: SessionState,
    pub max_lines: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub duration: Duration,
}

impl TailSession {
    pub fn new(
        config: SessionConfiguration,
        max_lines: usize,
        transport: Box<dyn LogTransport>,
    ) -> Result<Self, TailError> {
        config.validate()?;
        if max_lines == 0 {
            return Err(TailError::InvalidArgument {
                message: "max_lines must be at least 1".into(),
            });
        }
        Ok(Self {
            key: config.key(),
            config,
            instance_id: Uuid::new_v4().to_string(),
            max_lines,
            transport,
            cancel: CancellationToken::new(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                started_at: None,
                ended_at: None,
                start_instant: None,
                end_instant: None,
            }),
        })
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn config(&self) -> &SessionConfiguration {
        &self.config
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Token cancelled when the session stops.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> SessionState {
        lock_inner(&self.inner).state
    }

    pub fn is_stopped(&self) -> bool {
        self.state().is_terminal()
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        lock_inner(&self.inner).started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        lock_inner(&self.inner).ended_at
    }

    /// Open the streaming call. Allowed once per session.
    pub async fn start(&self) -> Result<Box<dyn FrameStream>, TailError> {
        {
            let mut inner = lock_inner(&self.inner);
            validate_transition(inner.state, SessionState::Starting)
                .map_err(|err| err.to_tail_error(self.key.as_str()))?;
            inner.state = SessionState::Starting;
            inner.started_at = Some(Utc::now());
            inner.start_instant = Some(Instant::now());
        }

        let stream = match self
            .transport
            .open_stream(&self.config, self.cancel.clone())
            .await
        {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "failed to open tail stream");
                self.stop();
                return Err(err);
            }
        };

        let mut inner = lock_inner(&self.inner);
        if inner.state == SessionState::Stopped {
            return Err(TailError::InvalidState {
                key: self.key.to_string(),
                current_state: inner.state.to_string(),
                operation: "start".into(),
            });
        }
        inner.state = SessionState::Running;
        tracing::info!(key = %self.key, instance_id = %self.instance_id, "tail session running");
        Ok(stream)
    }

    /// Cancel the stream, close the transport and record the end time.
    ///
    /// Returns `true` for the call that performed the stop; later calls are
    /// no-ops returning `false`.
    pub fn stop(&self) -> bool {
        {
            let mut inner = lock_inner(&self.inner);
            if inner.state == SessionState::Stopped {
                return false;
            }
            inner.state = SessionState::Stopped;
            if inner.ended_at.is_none() {
                inner.ended_at = Some(Utc::now());
                inner.end_instant = Some(Instant::now());
            }
        }

        self.cancel.cancel();
        self.transport.close();
        tracing::info!(
            key = %self.key,
            instance_id = %self.instance_id,
            duration_ms = self.duration().as_millis() as u64,
            "tail session stopped"
        );
        true
    }

    /// Time since start while running; start to stop once stopped; zero if
    /// never started.
    pub fn duration(&self) -> Duration {
        let inner = lock_inner(&self.inner);
        match (inner.start_instant, inner.end_instant) {
            (Some(start), Some(end)) => end.saturating_duration_since(start),
            (Some(start), None) => start.elapsed(),
            (None, _) => Duration::ZERO,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let (state, started_at) = {
            let inner = lock_inner(&self.inner);
            (inner.state, inner.started_at)
        };
        SessionSnapshot {
            key: self.key.clone(),
            instance_id: self.instance_id.clone(),
            config: self.config.clone(),
            state,
            max_lines: self.max_lines,
            started_at,
            duration: self.duration(),
        }
    }
}

impl std::fmt::Debug for TailSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TailSession")
            .field("key", &self.key)
            .field("instance_id", &self.instance_id)
            .field("max_lines", &self.max_lines)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn lock_inner(inner: &Mutex<SessionInner>) -> MutexGuard<'_, SessionInner> {
    match inner.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
