//! Stream reader task and its cancellation handle.
//!
//! The reader owns the handler and calls it from a single task, one event at
//! a time, in the order lines arrive. Each dispatch runs under a gate lock;
//! [`StreamHandle::close`] flips the gate under that same lock, so once it
//! returns the handler is never called again.

use std::cell::Cell;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use board_protocol::BoardError;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use parking_lot::{Mutex, ReentrantMutex};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::ndjson::{DEFAULT_MAX_LINE_BYTES, LineBuffer};

/// What the handler wants after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    /// The event carried a terminal game status. Reading continues (chat may
    /// still arrive) but a later server close is reported as `Finished`.
    Terminal,
}

/// How a stream ended on its own. Not reported after an explicit close.
#[derive(Debug, Clone)]
pub enum StreamEnd {
    /// Server closed the body after a terminal event.
    Finished,
    /// Server closed the body with no terminal event observed.
    ServerClosed,
    /// Connection error or idle timeout.
    Failed(BoardError),
}

impl StreamEnd {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// Receives decoded events from a stream reader.
pub trait EventHandler: Send + 'static {
    type Event: DeserializeOwned;

    /// Handle one event. Called sequentially from the reader task.
    fn on_event(&mut self, event: Self::Event) -> Control;

    /// Called once when the stream ends without an explicit close.
    fn on_end(&mut self, end: StreamEnd);
}

/// Reader configuration.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Fail the stream when no bytes arrive for this long. `None` disables it.
    /// Lichess sends a blank keep-alive line every few seconds.
    pub idle_timeout: Option<Duration>,
    /// Longest accepted line in bytes.
    pub max_line_bytes: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(30)),
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

struct Shared {
    label: String,
    /// `true` once closed by a caller. Held for the length of each dispatch.
    gate: ReentrantMutex<Cell<bool>>,
    /// Mirror of the gate flag, readable without waiting on a dispatch.
    closed: AtomicBool,
    /// `true` once the reader delivered its own end.
    ended: AtomicBool,
    task: Mutex<Option<AbortHandle>>,
    done_tx: watch::Sender<bool>,
}

impl Shared {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Cancellation handle for a running stream. Cheap to clone.
#[derive(Clone)]
pub struct StreamHandle {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("label", &self.shared.label)
            .field("closed", &self.is_closed())
            .field("ended", &self.has_ended())
            .finish()
    }
}

impl StreamHandle {
    fn new(label: String) -> Self {
        let (done_tx, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                label,
                gate: ReentrantMutex::new(Cell::new(false)),
                closed: AtomicBool::new(false),
                ended: AtomicBool::new(false),
                task: Mutex::new(None),
                done_tx,
            }),
        }
    }

    fn attach(&self, task: AbortHandle) {
        *self.shared.task.lock() = Some(task);
        // A close that raced the spawn found no task to abort.
        if self.shared.is_closed() {
            if let Some(task) = self.shared.task.lock().take() {
                task.abort();
            }
        }
    }

    /// Abort the connection. Idempotent; may be called from inside the handler.
    ///
    /// When this returns, the handler will not be invoked again.
    pub fn close(&self) {
        {
            let gate = self.shared.gate.lock();
            if gate.get() {
                return;
            }
            gate.set(true);
            self.shared.closed.store(true, Ordering::Release);
        }
        if let Some(task) = self.shared.task.lock().take() {
            task.abort();
        }
        self.shared.done_tx.send_replace(true);
        info!("Stream {} closed", self.shared.label);
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Whether the reader stopped on its own (server close or failure).
    pub fn has_ended(&self) -> bool {
        self.shared.ended.load(Ordering::Acquire)
    }

    /// Still reading.
    pub fn is_active(&self) -> bool {
        !self.is_closed() && !self.has_ended()
    }

    pub fn label(&self) -> &str {
        &self.shared.label
    }

    /// Wait until the stream is closed or has ended.
    pub async fn done(&self) {
        let mut rx = self.shared.done_tx.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// Drives one newline-delimited JSON body into a handler.
pub struct StreamReader<H: EventHandler> {
    label: String,
    handler: H,
    config: ReaderConfig,
}

impl<H: EventHandler> StreamReader<H> {
    pub fn new(label: impl Into<String>, handler: H, config: ReaderConfig) -> Self {
        Self {
            label: label.into(),
            handler,
            config,
        }
    }

    /// Start reading on a background task. Must be called inside a Tokio runtime.
    pub fn spawn<S, E>(self, body: S) -> StreamHandle
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: std::fmt::Display + Send + 'static,
    {
        let handle = StreamHandle::new(self.label);
        let shared = handle.shared.clone();
        debug!("Starting stream reader {}", shared.label);
        let task = tokio::spawn(pump(Box::pin(body), self.handler, self.config, shared));
        handle.attach(task.abort_handle());
        handle
    }
}

async fn pump<E, H>(
    mut body: Pin<Box<dyn Stream<Item = Result<Bytes, E>> + Send>>,
    mut handler: H,
    config: ReaderConfig,
    shared: Arc<Shared>,
) where
    E: std::fmt::Display + Send + 'static,
    H: EventHandler,
{
    let mut lines = LineBuffer::new(config.max_line_bytes);
    let mut terminal_seen = false;

    let end = loop {
        let next = match config.idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, body.next()).await {
                Ok(next) => next,
                Err(_) => {
                    break StreamEnd::Failed(BoardError::stream(format!(
                        "no data received for {}s",
                        idle.as_secs()
                    )));
                }
            },
            None => body.next().await,
        };

        match next {
            Some(Ok(chunk)) => {
                lines.push(&chunk);
                while let Some(line) = lines.next_line() {
                    if !dispatch_line(&shared, &mut handler, &line, &mut terminal_seen) {
                        return;
                    }
                }
            }
            Some(Err(e)) => break StreamEnd::Failed(BoardError::stream(e.to_string())),
            None => {
                if let Some(rest) = lines.take_remainder() {
                    if !dispatch_line(&shared, &mut handler, &rest, &mut terminal_seen) {
                        return;
                    }
                }
                break if terminal_seen {
                    StreamEnd::Finished
                } else {
                    StreamEnd::ServerClosed
                };
            }
        }
    };

    let gate = shared.gate.lock();
    if gate.get() {
        return;
    }
    match &end {
        StreamEnd::Finished => info!("Stream {} finished", shared.label),
        StreamEnd::ServerClosed => warn!(
            "Stream {} closed by server without a terminal event",
            shared.label
        ),
        StreamEnd::Failed(e) => warn!("Stream {} failed: {e}", shared.label),
    }
    shared.ended.store(true, Ordering::Release);
    handler.on_end(end);
    drop(gate);
    shared.done_tx.send_replace(true);
}

/// Decode and dispatch one line. Returns `false` once the stream is closed.
fn dispatch_line<H: EventHandler>(
    shared: &Shared,
    handler: &mut H,
    line: &[u8],
    terminal_seen: &mut bool,
) -> bool {
    let line = line.trim_ascii();
    if line.is_empty() {
        return !shared.is_closed();
    }

    let event = match serde_json::from_slice::<H::Event>(line) {
        Ok(event) => event,
        Err(e) => {
            let err = BoardError::malformed_line(String::from_utf8_lossy(line), e);
            warn!("Stream {}: skipping {err}", shared.label);
            return !shared.is_closed();
        }
    };

    let gate = shared.gate.lock();
    if gate.get() {
        return false;
    }
    if handler.on_event(event) == Control::Terminal {
        *terminal_seen = true;
    }
    !gate.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Ping {
        n: u32,
    }

    struct Collect {
        seen: Arc<Mutex<Vec<u32>>>,
        ends: Arc<Mutex<Vec<String>>>,
    }

    impl EventHandler for Collect {
        type Event = Ping;

        fn on_event(&mut self, event: Ping) -> Control {
            self.seen.lock().push(event.n);
            Control::Continue
        }

        fn on_end(&mut self, end: StreamEnd) {
            self.ends.lock().push(format!("{end:?}"));
        }
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, String>> + Send + 'static {
        let items: Vec<Result<Bytes, String>> =
            parts.iter().map(|p| Ok(Bytes::from_static(p.as_bytes()))).collect();
        futures_util::stream::iter(items)
    }

    #[tokio::test]
    async fn dispatches_in_order_and_reports_server_close() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ends = Arc::new(Mutex::new(Vec::new()));
        let handler = Collect {
            seen: seen.clone(),
            ends: ends.clone(),
        };
        let handle = StreamReader::new("test", handler, ReaderConfig::default())
            .spawn(chunks(&["{\"n\":1}\n{\"n\"", ":2}\n\n{\"n\":3}"]));
        handle.done().await;

        assert_eq!(*seen.lock(), vec![1, 2, 3]);
        let ends = ends.lock();
        assert_eq!(ends.len(), 1);
        assert!(ends[0].contains("ServerClosed"));
        assert!(handle.has_ended());
        assert!(!handle.is_active());
    }

    #[tokio::test]
    async fn close_before_data_suppresses_everything() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let ends = Arc::new(Mutex::new(Vec::new()));
        let handler = Collect {
            seen: seen.clone(),
            ends: ends.clone(),
        };
        let body = futures_util::stream::pending::<Result<Bytes, String>>();
        let handle = StreamReader::new("idle", handler, ReaderConfig::default()).spawn(body);
        handle.close();
        handle.close();
        handle.done().await;
        assert!(handle.is_closed());
        assert!(seen.lock().is_empty());
        assert!(ends.lock().is_empty());
    }
}
