//! Normalized error type for live tail operations.
//!
//! Transport-agnostic errors that hide the remote client's details and give
//! callers actionable categories.

/// Error for live tail session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TailError {
    /// Session configuration failed validation.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// A session is already registered for this key.
    #[error("session {key:?} already exists")]
    AlreadyExists { key: String },

    /// No session is registered for this key.
    #[error("session {key:?} not found")]
    NotFound { key: String },

    /// The session is in a state that does not allow the operation.
    #[error("session {key:?} in state {current_state:?} does not support {operation:?}")]
    InvalidState {
        key: String,
        current_state: String,
        operation: String,
    },

    /// The log service could not be reached.
    #[error("log service unavailable: {message}")]
    TransportUnavailable { message: String },

    /// The log service refused the request (credentials, region, log group).
    #[error("log service rejected request: {message}")]
    Rejected { message: String },

    /// The stream failed after it was opened.
    #[error("stream failed: {message}")]
    Stream { message: String },

    /// The document substrate refused an edit.
    #[error("document edit failed: {message}")]
    Document { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl TailError {
    /// Whether this error is fatal to a start attempt and should be shown to
    /// the user immediately.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument { .. }
                | Self::Rejected { .. }
                | Self::TransportUnavailable { .. }
        )
    }
}
