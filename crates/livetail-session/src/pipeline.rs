//! Frame ingestion: formats update frames into a session's document.
//!
//! Consumes frames from a [`FrameStream`] strictly in order until:
//! - the cancellation token fires (checked before every pull),
//! - the stream ends,
//! - the stream or the document reports an error.
//!
//! Errors end the run and are reported, never propagated to the host.

use std::sync::{Arc, MutexGuard};

use tokio_util::sync::CancellationToken;

use crate::document::{
    apply_lines, reveal_last_line, views_at_bottom, SharedDocument, TextDocument,
};
use crate::error::TailError;
use crate::event::{TailEvent, TailEventKind, TailEventSink};
use crate::format::format_records;
use crate::key::ResourceKey;
use crate::transport::{Frame, FrameStream, SessionUpdate};

/// Why a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineExit {
    Cancelled,
    /// The transport closed the stream.
    Closed,
    Failed(TailError),
}

/// Counters of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: usize,
    pub updates: usize,
    pub unrecognized: usize,
    pub records: usize,
    pub lines_appended: usize,
    pub lines_trimmed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub exit: PipelineExit,
    pub stats: PipelineStats,
}

/// Writes one session's frames into its document.
pub struct Pipeline {
    key: ResourceKey,
    document: SharedDocument,
    max_lines: usize,
    events: Arc<dyn TailEventSink>,
}

impl Pipeline {
    pub fn new(
        key: ResourceKey,
        document: SharedDocument,
        max_lines: usize,
        events: Arc<dyn TailEventSink>,
    ) -> Self {
        Self {
            key,
            document,
            max_lines,
            events,
        }
    }

    /// Pull and apply frames until cancellation, end of stream, or error.
    pub async fn run(
        &self,
        stream: &mut dyn FrameStream,
        cancel: &CancellationToken,
    ) -> PipelineReport {
        let mut stats = PipelineStats::default();

        let exit = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => break PipelineExit::Cancelled,
                next = stream.next() => next,
            };

            match next {
                None => break PipelineExit::Closed,
                Some(Err(err)) => {
                    tracing::warn!(key = %self.key, error = %err, "tail stream failed");
                    break PipelineExit::Failed(err);
                }
                Some(Ok(frame)) => {
                    stats.frames += 1;
                    match self.apply_frame(frame, &mut stats, Some(cancel)) {
                        Ok(true) => {}
                        // Stopped between the pull and the apply.
                        Ok(false) => break PipelineExit::Cancelled,
                        Err(err) => {
                            tracing::warn!(key = %self.key, error = %err, "failed to apply tail update");
                            break PipelineExit::Failed(err);
                        }
                    }
                }
            }
        };

        tracing::debug!(
            key = %self.key,
            exit = ?exit,
            frames = stats.frames,
            lines_appended = stats.lines_appended,
            lines_trimmed = stats.lines_trimmed,
            "tail pipeline finished"
        );
        PipelineReport { exit, stats }
    }

    /// Apply a single frame.
    pub fn handle_frame(&self, frame: Frame, stats: &mut PipelineStats) -> Result<(), TailError> {
        self.apply_frame(frame, stats, None).map(|_| ())
    }

    /// Returns `Ok(false)` when `cancel` fired before the update reached the
    /// document; the batch is then dropped.
    fn apply_frame(
        &self,
        frame: Frame,
        stats: &mut PipelineStats,
        cancel: Option<&CancellationToken>,
    ) -> Result<bool, TailError> {
        match frame {
            Frame::SessionStart(start) => {
                tracing::debug!(
                    key = %self.key,
                    log_groups = ?start.log_group_identifiers,
                    request_id = ?start.request_id,
                    "tail session started by service"
                );
                Ok(true)
            }
            Frame::SessionUpdate(update) => {
                stats.updates += 1;
                self.handle_update(&update, stats, cancel)
            }
            Frame::Unrecognized(shape) => {
                stats.unrecognized += 1;
                tracing::warn!(key = %self.key, frame = %shape, "ignoring unrecognized frame");
                Ok(true)
            }
        }
    }

    fn handle_update(
        &self,
        update: &SessionUpdate,
        stats: &mut PipelineStats,
        cancel: Option<&CancellationToken>,
    ) -> Result<bool, TailError> {
        stats.records += update.results.len();
        let lines = format_records(&update.results);

        if !lines.is_empty() {
            let mut document = lock_document(&self.document);
            // Checked under the lock: teardown cancels before it clears.
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Ok(false);
            }
            // Decide before mutating: a large batch can push the last line
            // out of every visible range.
            let follow = views_at_bottom(&*document);
            let outcome = apply_lines(&mut *document, &lines, self.max_lines)?;
            reveal_last_line(&mut *document, &follow);

            stats.lines_appended += outcome.appended;
            stats.lines_trimmed += outcome.trimmed;
        }

        self.events.record(TailEvent::new(
            self.key.clone(),
            TailEventKind::Update {
                sampled: update.metadata.sampled,
                event_count: update.results.len(),
            },
        ));
        Ok(true)
    }
}

pub(crate) fn lock_document(document: &SharedDocument) -> MutexGuard<'_, dyn TextDocument + 'static> {
    match document.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
