//! Session lifecycle states and transition guardrails.

use std::fmt;

use crate::error::TailError;

/// Lifecycle of a single tail session. `Stopped` is terminal: a stopped
/// session is never restarted, a new one is constructed instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopped,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Stopped
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: SessionState,
    pub to: SessionState,
}

impl TransitionError {
    pub fn to_tail_error(self, key: &str) -> TailError {
        TailError::InvalidState {
            key: key.to_string(),
            current_state: self.from.to_string(),
            operation: format!("transition_to_{}", self.to),
        }
    }
}

pub fn is_valid_transition(from: SessionState, to: SessionState) -> bool {
    matches!(
        (from, to),
        (SessionState::Idle, SessionState::Starting)
            | (SessionState::Starting, SessionState::Running)
            // Stop is reachable from every state and repeats as a no-op.
            | (_, SessionState::Stopped)
    )
}

pub fn validate_transition(from: SessionState, to: SessionState) -> Result<(), TransitionError> {
    if is_valid_transition(from, to) {
        Ok(())
    } else {
        Err(TransitionError { from, to })
    }
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The user asked for it.
    Explicit,
    /// No view of the session's document remains open.
    ViewsClosed,
    /// The frame stream ended or failed.
    StreamEnded,
    /// The host is shutting down.
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Explicit => "explicit",
            Self::ViewsClosed => "views_closed",
            Self::StreamEnded => "stream_ended",
            Self::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}
