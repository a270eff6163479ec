//! Session event recording for status indicators and auditing.
//!
//! Every lifecycle step and status refresh of a session emits a [`TailEvent`].
//! A host's status bar (sampled flag, event rate, elapsed time) is one sink;
//! an audit log is another.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::key::ResourceKey;
use crate::lifecycle::StopReason;

/// What happened to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEventKind {
    Started,
    /// A tailing request matched a running session; its document was focused.
    Refocused,
    StartFailed(String),
    /// One update frame was processed.
    Update { sampled: bool, event_count: usize },
    /// Periodic duration refresh.
    Elapsed(Duration),
    Stopped(StopReason),
    Cleared,
}

impl std::fmt::Display for TailEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => f.write_str("started"),
            Self::Refocused => f.write_str("refocused"),
            Self::StartFailed(reason) => write!(f, "start_failed: {reason}"),
            Self::Update {
                sampled,
                event_count,
            } => write!(f, "update: {event_count} events (sampled={sampled})"),
            Self::Elapsed(elapsed) => write!(f, "elapsed: {}", format_elapsed(*elapsed)),
            Self::Stopped(reason) => write!(f, "stopped: {reason}"),
            Self::Cleared => f.write_str("cleared"),
        }
    }
}

/// An event emitted for one session.
#[derive(Debug, Clone)]
pub struct TailEvent {
    pub timestamp: DateTime<Utc>,
    pub key: ResourceKey,
    pub kind: TailEventKind,
}

impl TailEvent {
    pub fn new(key: ResourceKey, kind: TailEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            key,
            kind,
        }
    }
}

/// Renders an elapsed time as `HH:MM:SS`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Trait for sinks that receive tail events.
pub trait TailEventSink: Send + Sync {
    fn record(&self, event: TailEvent);
}

/// In-memory event sink for testing.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: std::sync::Mutex<Vec<TailEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TailEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self) -> usize {
        match self.events.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Kinds recorded for `key`, in order.
    pub fn kinds_for(&self, key: &ResourceKey) -> Vec<TailEventKind> {
        self.events()
            .into_iter()
            .filter(|event| &event.key == key)
            .map(|event| event.kind)
            .collect()
    }
}

impl TailEventSink for InMemoryEventSink {
    fn record(&self, event: TailEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

/// Sink that forwards events to `tracing` at debug level.
pub struct TracingEventSink;

impl TailEventSink for TracingEventSink {
    fn record(&self, event: TailEvent) {
        tracing::debug!(key = %event.key, event = %event.kind, "tail event");
    }
}

/// No-op event sink that discards all events.
pub struct NullEventSink;

impl TailEventSink for NullEventSink {
    fn record(&self, _event: TailEvent) {}
}
