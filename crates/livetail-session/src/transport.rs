//! Log service transport seam.
//!
//! The remote log service is a black box that, once a stream is opened,
//! yields [`Frame`]s until it closes. Implementations can be backed by:
//! - a server-side streaming RPC against the log service
//! - a replayed capture
//! - in-memory sequences for testing (see [`crate::mock`])

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::TailError;
use crate::key::SessionConfiguration;

/// One log event as delivered by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogRecord {
    /// Event time in epoch milliseconds.
    pub timestamp: Option<i64>,
    pub message: Option<String>,
    pub log_stream: Option<String>,
}

impl LogRecord {
    pub fn new(timestamp: i64, message: impl Into<String>) -> Self {
        Self {
            timestamp: Some(timestamp),
            message: Some(message.into()),
            log_stream: None,
        }
    }
}

/// Marker frame sent once the service accepted the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStart {
    pub log_group_identifiers: Vec<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionMetadata {
    /// The service dropped events to keep up with the ingest rate.
    pub sampled: bool,
}

/// Batch of events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub metadata: SessionMetadata,
    pub results: Vec<LogRecord>,
}

/// One message of the streaming response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    SessionStart(SessionStart),
    SessionUpdate(SessionUpdate),
    /// A frame shape this client does not know; carries a description for logs.
    Unrecognized(String),
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStart(_) => "session_start",
            Self::SessionUpdate(_) => "session_update",
            Self::Unrecognized(_) => "unrecognized",
        }
    }
}

/// A lazy, non-restartable sequence of frames.
#[async_trait]
pub trait FrameStream: Send {
    /// Wait for and return the next frame.
    ///
    /// Returns `None` when the stream is exhausted (remote closed,
    /// cancellation observed by the transport).
    async fn next(&mut self) -> Option<Result<Frame, TailError>>;
}

/// Client handle for one session's streaming call.
#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Open the streaming call. Parameter rejections (credentials, region,
    /// log group) surface here as errors.
    async fn open_stream(
        &self,
        config: &SessionConfiguration,
        cancel: CancellationToken,
    ) -> Result<Box<dyn FrameStream>, TailError>;

    /// Release the client. Called once per session, after cancellation.
    fn close(&self);
}

/// Creates one [`LogTransport`] per session.
pub trait TransportConnector: Send + Sync {
    fn connect(&self, config: &SessionConfiguration) -> Result<Box<dyn LogTransport>, TailError>;
}
