#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Frame ingestion: formatting, bounded documents, follow-scrolling,
//! malformed frames, stream errors and cancellation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use livetail_session::document::{LineBuffer, LineRange, SharedDocument, TextDocument};
use livetail_session::error::TailError;
use livetail_session::event::{InMemoryEventSink, TailEventKind};
use livetail_session::mock::{
    start_frame, test_config, update_frame, MockScript, MockTransport, TEST_EPOCH_MILLIS,
};
use livetail_session::pipeline::{Pipeline, PipelineExit, PipelineReport, PipelineStats};
use livetail_session::transport::{
    Frame, FrameStream, LogRecord, LogTransport, SessionMetadata, SessionUpdate,
};

// ── Helpers ──

struct Harness {
    buffer: Arc<Mutex<LineBuffer>>,
    events: Arc<InMemoryEventSink>,
    pipeline: Pipeline,
}

fn harness(max_lines: usize) -> Harness {
    harness_with_buffer(LineBuffer::new(), max_lines)
}

fn harness_with_buffer(buffer: LineBuffer, max_lines: usize) -> Harness {
    let buffer = Arc::new(Mutex::new(buffer));
    let document: SharedDocument = buffer.clone();
    let events = Arc::new(InMemoryEventSink::new());
    let pipeline = Pipeline::new(test_config("app").key(), document, max_lines, events.clone());
    Harness {
        buffer,
        events,
        pipeline,
    }
}

impl Harness {
    fn text(&self) -> String {
        self.buffer.lock().unwrap().text()
    }

    async fn run(&self, script: MockScript, cancel: &CancellationToken) -> PipelineReport {
        let mut stream = open(script, cancel).await;
        self.pipeline.run(stream.as_mut(), cancel).await
    }
}

async fn open(script: MockScript, cancel: &CancellationToken) -> Box<dyn FrameStream> {
    MockTransport::new(script)
        .open_stream(&test_config("app"), cancel.clone())
        .await
        .unwrap()
}

// ── formatting ──

#[tokio::test]
async fn update_records_become_timestamped_lines() {
    let h = harness(100);
    let report = h
        .run(
            MockScript::frames(vec![start_frame("app"), update_frame(&["boot", "ready\n"])]),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.exit, PipelineExit::Closed);
    assert_eq!(h.text(), "12:00:00\tboot\n12:00:01\tready\n");
    assert_eq!(report.stats.frames, 2);
    assert_eq!(report.stats.updates, 1);
    assert_eq!(report.stats.lines_appended, 2);
}

#[tokio::test]
async fn records_without_timestamp_or_message_are_skipped() {
    let h = harness(100);
    let update = Frame::SessionUpdate(SessionUpdate {
        metadata: SessionMetadata { sampled: true },
        results: vec![
            LogRecord {
                timestamp: None,
                message: Some("no time".into()),
                log_stream: None,
            },
            LogRecord {
                timestamp: Some(TEST_EPOCH_MILLIS),
                message: None,
                log_stream: None,
            },
            LogRecord::new(TEST_EPOCH_MILLIS, ""),
            LogRecord::new(TEST_EPOCH_MILLIS + 2_000, "kept"),
        ],
    });

    let report = h
        .run(MockScript::frames(vec![update]), &CancellationToken::new())
        .await;

    assert_eq!(h.text(), "12:00:02\tkept\n");
    assert_eq!(report.stats.records, 4);
    assert_eq!(report.stats.lines_appended, 1);
    assert_eq!(
        h.events.events()[0].kind,
        TailEventKind::Update {
            sampled: true,
            event_count: 4
        }
    );
}

#[tokio::test]
async fn empty_update_still_reports_status() {
    let h = harness(100);
    h.run(MockScript::frames(vec![update_frame(&[])]), &CancellationToken::new())
        .await;

    assert_eq!(h.text(), "");
    assert_eq!(h.buffer.lock().unwrap().edits_applied(), 0);
    assert_eq!(
        h.events.kinds_for(&test_config("app").key()),
        vec![TailEventKind::Update {
            sampled: false,
            event_count: 0
        }]
    );
}

// ── bounded document ──

#[tokio::test]
async fn document_keeps_only_the_newest_line() {
    let h = harness(1);
    let report = h
        .run(
            MockScript::frames(vec![
                update_frame(&["m1"]),
                update_frame(&["m2"]),
                update_frame(&["m3"]),
            ]),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(h.text(), "12:00:00\tm3\n");
    assert_eq!(report.stats.lines_appended, 3);
    assert_eq!(report.stats.lines_trimmed, 2);
    // One atomic edit per update.
    assert_eq!(h.buffer.lock().unwrap().edits_applied(), 3);
}

#[tokio::test]
async fn batch_larger_than_limit_keeps_its_tail() {
    let h = harness(2);
    h.run(
        MockScript::frames(vec![update_frame(&["a", "b"]), update_frame(&["c", "d", "e"])]),
        &CancellationToken::new(),
    )
    .await;

    assert_eq!(h.text(), "12:00:01\td\n12:00:02\te\n");
}

#[tokio::test]
async fn line_count_never_exceeds_limit() {
    let h = harness(5);
    let frames = (0..20)
        .map(|i| {
            let message = format!("m{i}");
            update_frame(&[message.as_str(), "x"])
        })
        .collect();
    h.run(MockScript::frames(frames), &CancellationToken::new())
        .await;

    let buffer = h.buffer.lock().unwrap();
    assert_eq!(buffer.line_count(), 5);
    assert_eq!(buffer.lines().last().unwrap(), "12:00:01\tx");
}

// ── follow-scrolling ──

#[tokio::test]
async fn view_at_bottom_follows_new_lines() {
    let mut buffer = LineBuffer::new();
    let view = buffer.open_view(3);
    let h = harness_with_buffer(buffer, 100);

    h.run(
        MockScript::frames(vec![update_frame(&["a", "b"]), update_frame(&["c", "d", "e"])]),
        &CancellationToken::new(),
    )
    .await;

    let buffer = h.buffer.lock().unwrap();
    let range = buffer.visible_range(view).unwrap();
    assert!(range.contains(4), "range {range:?} should show the last line");
}

#[tokio::test]
async fn view_at_bottom_follows_a_batch_taller_than_the_view() {
    let mut buffer = LineBuffer::new();
    let view = buffer.open_view(2);
    let h = harness_with_buffer(buffer, 100);

    h.run(
        MockScript::frames(vec![update_frame(&["a", "b", "c", "d", "e", "f"])]),
        &CancellationToken::new(),
    )
    .await;

    let buffer = h.buffer.lock().unwrap();
    assert!(buffer.visible_range(view).unwrap().contains(5));
}

#[tokio::test]
async fn scrolled_up_view_stays_put() {
    let mut buffer = LineBuffer::new();
    let following = buffer.open_view(2);
    let reading = buffer.open_view(2);
    let h = harness_with_buffer(buffer, 100);
    let cancel = CancellationToken::new();

    let (tx, script) = MockScript::channel();
    let mut stream = open(script, &cancel).await;

    tx.send(Ok(update_frame(&["a", "b", "c", "d"]))).unwrap();
    tx.send(Ok(update_frame(&["e", "f"]))).unwrap();
    drop(tx);

    // Apply the first batch, then scroll the reading view back to the top.
    let first = stream.next().await.unwrap().unwrap();
    let mut stats = PipelineStats::default();
    h.pipeline.handle_frame(first, &mut stats).unwrap();
    h.buffer.lock().unwrap().scroll_to(reading, 0);

    h.pipeline.run(stream.as_mut(), &cancel).await;

    let buffer = h.buffer.lock().unwrap();
    assert_eq!(buffer.line_count(), 6);
    assert!(buffer.visible_range(following).unwrap().contains(5));
    assert_eq!(
        buffer.visible_range(reading).unwrap(),
        LineRange::new(0, 2)
    );
}

// ── malformed frames ──

#[tokio::test]
async fn unrecognized_frames_are_skipped() {
    let h = harness(100);
    let report = h
        .run(
            MockScript::frames(vec![
                update_frame(&["before"]),
                Frame::Unrecognized("heartbeat".into()),
                update_frame(&["after"]),
            ]),
            &CancellationToken::new(),
        )
        .await;

    assert_eq!(report.exit, PipelineExit::Closed);
    assert_eq!(report.stats.unrecognized, 1);
    assert_eq!(h.text(), "12:00:00\tbefore\n12:00:00\tafter\n");
}

// ── termination ──

#[tokio::test]
async fn stream_error_ends_the_run_and_keeps_earlier_lines() {
    let h = harness(100);
    let err = TailError::Stream {
        message: "connection reset".into(),
    };
    let script = MockScript::Frames {
        frames: vec![
            (Duration::ZERO, Ok(update_frame(&["first"]))),
            (Duration::ZERO, Err(err.clone())),
            (Duration::ZERO, Ok(update_frame(&["never"]))),
        ],
        hold_open: false,
    };

    let report = h.run(script, &CancellationToken::new()).await;

    assert_eq!(report.exit, PipelineExit::Failed(err));
    assert_eq!(h.text(), "12:00:00\tfirst\n");
}

#[tokio::test]
async fn cancelled_token_stops_before_pulling() {
    let h = harness(100);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = h
        .run(MockScript::frames(vec![update_frame(&["late"])]), &cancel)
        .await;

    assert_eq!(report.exit, PipelineExit::Cancelled);
    assert_eq!(report.stats.frames, 0);
    assert_eq!(h.text(), "");
}

/// Yields one update, cancelling `cancel` as it hands the frame over.
struct CancelOnPull {
    cancel: CancellationToken,
    frame: Option<Frame>,
}

#[async_trait]
impl FrameStream for CancelOnPull {
    async fn next(&mut self) -> Option<Result<Frame, TailError>> {
        self.cancel.cancel();
        self.frame.take().map(Ok)
    }
}

#[tokio::test]
async fn stop_between_pull_and_apply_drops_the_batch() {
    let h = harness(100);
    let cancel = CancellationToken::new();
    let mut stream = CancelOnPull {
        cancel: cancel.clone(),
        frame: Some(update_frame(&["late"])),
    };

    let report = h.pipeline.run(&mut stream, &cancel).await;

    assert_eq!(report.exit, PipelineExit::Cancelled);
    assert_eq!(report.stats.lines_appended, 0);
    assert_eq!(h.text(), "");
    assert_eq!(h.buffer.lock().unwrap().edits_applied(), 0);
}

#[tokio::test]
async fn cancellation_ends_a_quiet_stream() {
    let h = Arc::new(harness(100));
    let cancel = CancellationToken::new();
    let (tx, script) = MockScript::channel();
    let mut stream = open(script, &cancel).await;

    tx.send(Ok(update_frame(&["one"]))).unwrap();

    let run = {
        let h = Arc::clone(&h);
        let cancel = cancel.clone();
        tokio::spawn(async move { h.pipeline.run(stream.as_mut(), &cancel).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    let report = tokio::time::timeout(Duration::from_secs(1), run)
        .await
        .expect("pipeline should stop after cancellation")
        .unwrap();

    assert_eq!(report.exit, PipelineExit::Cancelled);
    assert_eq!(h.text(), "12:00:00\tone\n");
    drop(tx);
}

#[tokio::test(start_paused = true)]
async fn delayed_frames_arrive_in_order() {
    let h = harness(100);
    let script = MockScript::Frames {
        frames: vec![
            (Duration::from_millis(300), Ok(update_frame(&["slow"]))),
            (Duration::from_millis(10), Ok(update_frame(&["fast"]))),
        ],
        hold_open: false,
    };

    h.run(script, &CancellationToken::new()).await;
    assert_eq!(h.text(), "12:00:00\tslow\n12:00:00\tfast\n");
}
