//! livetail-session: live tailing of a cloud log group into an editor
//! document.
//!
//! A [`TailCoordinator`] turns a [`SessionConfiguration`] into a running
//! [`TailSession`], keyed by its [`ResourceKey`] so that at most one session
//! tails the same source. Frames from the session's stream are formatted and
//! appended to the session's document, bounded to a maximum line count, with
//! views that were following the end kept at the end.

pub mod coordinator;
pub mod document;
pub mod error;
pub mod event;
pub mod format;
pub mod key;
pub mod lifecycle;
pub mod mock;
pub mod pipeline;
pub mod registry;
pub mod session;
pub mod transport;
pub mod workspace;

pub use coordinator::{CoordinatorSettings, StartOutcome, TailCoordinator};
pub use document::{LineBuffer, SharedDocument, TextDocument, ViewId};
pub use error::TailError;
pub use event::{TailEvent, TailEventKind, TailEventSink};
pub use key::{derive_key, ResourceKey, SessionConfiguration, StreamFilter};
pub use lifecycle::{SessionState, StopReason};
pub use registry::SessionRegistry;
pub use session::{SessionSnapshot, TailSession};
pub use transport::{Frame, FrameStream, LogRecord, LogTransport, TransportConnector};
pub use workspace::{InMemoryWorkspace, ViewEvent, Workspace};

/// Stable crate label used for bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "livetail-session"
}
