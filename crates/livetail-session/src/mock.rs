//! Mock transport for unit testing.
//!
//! Provides scripted frame streams, a transport that counts opens/closes,
//! and a connector handing out one scripted transport per session.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TailError;
use crate::key::SessionConfiguration;
use crate::transport::{
    Frame, FrameStream, LogRecord, LogTransport, SessionMetadata, SessionStart, SessionUpdate,
    TransportConnector,
};

/// What a mock transport does when its stream is opened.
pub enum MockScript {
    /// Yield frames in order, each after its delay. With `hold_open` the
    /// stream stays pending after the last frame until cancelled, like a live
    /// stream with no traffic; otherwise it ends.
    Frames {
        frames: Vec<(Duration, Result<Frame, TailError>)>,
        hold_open: bool,
    },
    /// Yield whatever the test sends; ends when the sender is dropped.
    Channel(mpsc::UnboundedReceiver<Result<Frame, TailError>>),
    /// Refuse to open.
    Reject(TailError),
}

impl MockScript {
    /// Frames delivered immediately, then end of stream.
    pub fn frames(frames: Vec<Frame>) -> Self {
        Self::Frames {
            frames: frames.into_iter().map(|f| (Duration::ZERO, Ok(f))).collect(),
            hold_open: false,
        }
    }

    /// Frames delivered immediately, then stay open until cancelled.
    pub fn frames_then_hold(frames: Vec<Frame>) -> Self {
        Self::Frames {
            frames: frames.into_iter().map(|f| (Duration::ZERO, Ok(f))).collect(),
            hold_open: true,
        }
    }

    /// A channel-driven script and its sender.
    pub fn channel() -> (mpsc::UnboundedSender<Result<Frame, TailError>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::Channel(rx))
    }
}

/// Shared call counters of mock transports.
#[derive(Debug, Default)]
pub struct MockCounters {
    connects: AtomicUsize,
    opens: AtomicUsize,
    closes: AtomicUsize,
}

impl MockCounters {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Mock implementation of [`LogTransport`].
pub struct MockTransport {
    script: Mutex<Option<MockScript>>,
    counters: Arc<MockCounters>,
    open_delay: Duration,
}

impl MockTransport {
    pub fn new(script: MockScript) -> Self {
        Self::with_counters(script, Arc::new(MockCounters::default()))
    }

    pub fn with_counters(script: MockScript, counters: Arc<MockCounters>) -> Self {
        Self {
            script: Mutex::new(Some(script)),
            counters,
            open_delay: Duration::ZERO,
        }
    }

    /// Make `open_stream` take `delay` before answering, like a slow handshake.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }
}

#[async_trait]
impl LogTransport for MockTransport {
    async fn open_stream(
        &self,
        _config: &SessionConfiguration,
        cancel: CancellationToken,
    ) -> Result<Box<dyn FrameStream>, TailError> {
        self.counters.opens.fetch_add(1, Ordering::SeqCst);
        if !self.open_delay.is_zero() {
            tokio::time::sleep(self.open_delay).await;
        }
        let script = match self.script.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match script {
            Some(MockScript::Frames { frames, hold_open }) => Ok(Box::new(MockFrameStream {
                frames: frames.into(),
                hold_open,
                cancel,
            })),
            Some(MockScript::Channel(rx)) => Ok(Box::new(ChannelFrameStream { rx, cancel })),
            Some(MockScript::Reject(err)) => Err(err),
            None => Err(TailError::Internal {
                message: "mock stream already opened".into(),
            }),
        }
    }

    fn close(&self) {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted frame stream.
pub struct MockFrameStream {
    frames: VecDeque<(Duration, Result<Frame, TailError>)>,
    hold_open: bool,
    cancel: CancellationToken,
}

#[async_trait]
impl FrameStream for MockFrameStream {
    async fn next(&mut self) -> Option<Result<Frame, TailError>> {
        let Some((delay, item)) = self.frames.pop_front() else {
            if self.hold_open {
                self.cancel.cancelled().await;
            }
            return None;
        };
        if !delay.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Some(item)
    }
}

/// Frame stream fed by a test through a channel.
pub struct ChannelFrameStream {
    rx: mpsc::UnboundedReceiver<Result<Frame, TailError>>,
    cancel: CancellationToken,
}

#[async_trait]
impl FrameStream for ChannelFrameStream {
    async fn next(&mut self) -> Option<Result<Frame, TailError>> {
        tokio::select! {
            _ = self.cancel.cancelled() => None,
            item = self.rx.recv() => item,
        }
    }
}

/// Mock [`TransportConnector`] handing out scripted transports in order.
///
/// Once the queued scripts are used up, further sessions get a stream that
/// stays open with no traffic.
pub struct MockConnector {
    scripts: Mutex<VecDeque<MockScript>>,
    connect_error: Mutex<Option<TailError>>,
    counters: Arc<MockCounters>,
    open_delay: Duration,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            connect_error: Mutex::new(None),
            counters: Arc::new(MockCounters::default()),
            open_delay: Duration::ZERO,
        }
    }

    /// Delay every stream open of the transports handed out.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    pub fn with_script(self, script: MockScript) -> Self {
        self.push_script(script);
        self
    }

    /// Configure the next connect to fail.
    pub fn with_connect_error(self, err: TailError) -> Self {
        match self.connect_error.lock() {
            Ok(mut e) => *e = Some(err),
            Err(poisoned) => *poisoned.into_inner() = Some(err),
        }
        self
    }

    pub fn push_script(&self, script: MockScript) {
        match self.scripts.lock() {
            Ok(mut guard) => guard.push_back(script),
            Err(poisoned) => poisoned.into_inner().push_back(script),
        }
    }

    pub fn counters(&self) -> Arc<MockCounters> {
        Arc::clone(&self.counters)
    }

    fn next_script(&self) -> MockScript {
        let next = match self.scripts.lock() {
            Ok(mut guard) => guard.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or_else(|| MockScript::frames_then_hold(Vec::new()))
    }
}

impl TransportConnector for MockConnector {
    fn connect(&self, _config: &SessionConfiguration) -> Result<Box<dyn LogTransport>, TailError> {
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        let err = match self.connect_error.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(err) = err {
            return Err(err);
        }
        Ok(Box::new(
            MockTransport::with_counters(self.next_script(), Arc::clone(&self.counters))
                .with_open_delay(self.open_delay),
        ))
    }
}

/// Base timestamp of test records: 1997-10-14T12:00:00Z.
pub const TEST_EPOCH_MILLIS: i64 = 876_830_400_000;

/// A session start frame for `log_group`.
pub fn start_frame(log_group: &str) -> Frame {
    Frame::SessionStart(SessionStart {
        log_group_identifiers: vec![log_group.to_string()],
        request_id: None,
    })
}

/// An update frame with one record per message, one second apart from
/// [`TEST_EPOCH_MILLIS`].
pub fn update_frame(messages: &[&str]) -> Frame {
    Frame::SessionUpdate(SessionUpdate {
        metadata: SessionMetadata::default(),
        results: messages
            .iter()
            .enumerate()
            .map(|(i, message)| LogRecord::new(TEST_EPOCH_MILLIS + i as i64 * 1000, *message))
            .collect(),
    })
}

/// Helper to create a test configuration with sensible defaults.
pub fn test_config(log_group: &str) -> SessionConfiguration {
    SessionConfiguration::new("us-east-1", log_group)
}
