//! Stream reader behavior: ordering, malformed lines, end reporting, cancellation.

use std::sync::Arc;
use std::time::Duration;

use board_protocol::BoardErrorCode;
use board_transport::{Control, EventHandler, ReaderConfig, StreamEnd, StreamHandle, StreamReader};
use bytes::Bytes;
use futures_util::Stream;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::timeout;

#[derive(Debug, Deserialize)]
struct Event {
    n: u32,
    #[serde(default)]
    last: bool,
    #[serde(default)]
    tag: Option<String>,
}

#[derive(Default)]
struct Log {
    events: Vec<u32>,
    tags: Vec<String>,
    ends: Vec<StreamEnd>,
}

struct Recorder {
    log: Arc<Mutex<Log>>,
    /// Closes its own stream when it sees this event number.
    close_on: Option<(u32, Arc<Mutex<Option<StreamHandle>>>)>,
}

impl Recorder {
    fn new(log: Arc<Mutex<Log>>) -> Self {
        Self { log, close_on: None }
    }
}

impl EventHandler for Recorder {
    type Event = Event;

    fn on_event(&mut self, event: Event) -> Control {
        let mut log = self.log.lock();
        log.events.push(event.n);
        log.tags.extend(event.tag);
        drop(log);
        if let Some((n, handle)) = &self.close_on {
            if *n == event.n {
                if let Some(handle) = handle.lock().as_ref() {
                    handle.close();
                }
            }
        }
        if event.last {
            Control::Terminal
        } else {
            Control::Continue
        }
    }

    fn on_end(&mut self, end: StreamEnd) {
        self.log.lock().ends.push(end);
    }
}

fn body(parts: Vec<&'static str>) -> impl Stream<Item = Result<Bytes, String>> + Send + 'static {
    futures_util::stream::iter(
        parts
            .into_iter()
            .map(|p| Ok::<_, String>(Bytes::from_static(p.as_bytes())))
            .collect::<Vec<_>>(),
    )
}

/// Body fed by a channel so the test controls timing.
fn channel_body() -> (
    mpsc::UnboundedSender<Result<Bytes, String>>,
    impl Stream<Item = Result<Bytes, String>> + Send + 'static,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    });
    (tx, stream)
}

async fn wait_done(handle: &StreamHandle) {
    timeout(Duration::from_secs(5), handle.done())
        .await
        .expect("stream did not finish in time");
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoding
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_line_does_not_stop_later_lines() {
    let log = Arc::new(Mutex::new(Log::default()));
    let handle = StreamReader::new("malformed", Recorder::new(log.clone()), ReaderConfig::default())
        .spawn(body(vec![
            "{\"n\":1}\n",
            "this is not json\n",
            "{\"n\":\"wrong type\"}\n",
            "{\"n\":2}\n",
        ]));
    wait_done(&handle).await;

    let log = log.lock();
    assert_eq!(log.events, vec![1, 2]);
    assert_eq!(log.ends.len(), 1);
}

#[tokio::test]
async fn invalid_utf8_line_is_skipped_not_repaired() {
    let log = Arc::new(Mutex::new(Log::default()));
    let parts: Vec<Result<Bytes, String>> = vec![
        Ok(Bytes::from_static(b"{\"n\":1,\"tag\":\"ok\"}\n")),
        Ok(Bytes::from_static(b"{\"n\":2,\"tag\":\"ab\xffcd\"}\n")),
        Ok(Bytes::from_static(b"{\"n\":3}\n")),
    ];
    let handle = StreamReader::new("utf8", Recorder::new(log.clone()), ReaderConfig::default())
        .spawn(futures_util::stream::iter(parts));
    wait_done(&handle).await;

    let log = log.lock();
    assert_eq!(log.events, vec![1, 3]);
    assert_eq!(log.tags, vec!["ok".to_string()]);
}

#[tokio::test]
async fn keepalive_blank_lines_are_ignored() {
    let log = Arc::new(Mutex::new(Log::default()));
    let handle = StreamReader::new("keepalive", Recorder::new(log.clone()), ReaderConfig::default())
        .spawn(body(vec!["\n", "\n", "{\"n\":7}\n", "\n"]));
    wait_done(&handle).await;
    assert_eq!(log.lock().events, vec![7]);
}

// ─────────────────────────────────────────────────────────────────────────────
// End reporting
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn close_after_terminal_event_is_finished() {
    let log = Arc::new(Mutex::new(Log::default()));
    let handle = StreamReader::new("finished", Recorder::new(log.clone()), ReaderConfig::default())
        .spawn(body(vec!["{\"n\":1}\n{\"n\":2,\"last\":true}\n"]));
    wait_done(&handle).await;

    let log = log.lock();
    assert_eq!(log.ends.len(), 1);
    assert!(matches!(log.ends[0], StreamEnd::Finished));
    assert!(log.ends[0].is_clean());
}

#[tokio::test]
async fn close_without_terminal_event_is_distinct() {
    let log = Arc::new(Mutex::new(Log::default()));
    let handle = StreamReader::new("dropped", Recorder::new(log.clone()), ReaderConfig::default())
        .spawn(body(vec!["{\"n\":1}\n"]));
    wait_done(&handle).await;

    let log = log.lock();
    assert!(matches!(log.ends[0], StreamEnd::ServerClosed));
    assert!(!log.ends[0].is_clean());
}

#[tokio::test]
async fn transport_error_is_reported_once() {
    let log = Arc::new(Mutex::new(Log::default()));
    let (tx, stream) = channel_body();
    let handle = StreamReader::new("broken", Recorder::new(log.clone()), ReaderConfig::default())
        .spawn(stream);

    tx.send(Ok(Bytes::from_static(b"{\"n\":1}\n"))).unwrap();
    tx.send(Err("connection reset".into())).unwrap();
    wait_done(&handle).await;

    let log = log.lock();
    assert_eq!(log.events, vec![1]);
    assert_eq!(log.ends.len(), 1);
    match &log.ends[0] {
        StreamEnd::Failed(err) => {
            assert_eq!(err.code(), BoardErrorCode::StreamTransport);
            assert!(err.to_string().contains("connection reset"));
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn idle_timeout_fails_the_stream() {
    let log = Arc::new(Mutex::new(Log::default()));
    let (tx, stream) = channel_body();
    let config = ReaderConfig {
        idle_timeout: Some(Duration::from_millis(50)),
        ..Default::default()
    };
    let handle = StreamReader::new("idle", Recorder::new(log.clone()), config).spawn(stream);
    tx.send(Ok(Bytes::from_static(b"{\"n\":1}\n"))).unwrap();
    wait_done(&handle).await;

    let log = log.lock();
    assert_eq!(log.events, vec![1]);
    assert!(matches!(log.ends[0], StreamEnd::Failed(_)));
    assert!(handle.has_ended());
    drop(tx);
}

// ─────────────────────────────────────────────────────────────────────────────
// Cancellation
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn close_twice_is_a_noop() {
    let log = Arc::new(Mutex::new(Log::default()));
    let (tx, stream) = channel_body();
    let handle = StreamReader::new("twice", Recorder::new(log.clone()), ReaderConfig::default())
        .spawn(stream);

    tx.send(Ok(Bytes::from_static(b"{\"n\":1}\n"))).unwrap();
    timeout(Duration::from_secs(5), async {
        while log.lock().events.is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    handle.close();
    handle.close();
    let _ = tx.send(Ok(Bytes::from_static(b"{\"n\":2}\n")));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let log = log.lock();
    assert_eq!(log.events, vec![1]);
    assert!(log.ends.is_empty(), "no end callback after explicit close");
    assert!(handle.is_closed());
}

#[tokio::test]
async fn no_events_after_close_returns() {
    let log = Arc::new(Mutex::new(Log::default()));
    let (tx, stream) = channel_body();
    let handle = StreamReader::new("flood", Recorder::new(log.clone()), ReaderConfig::default())
        .spawn(stream);

    let feeder = tokio::spawn(async move {
        for n in 0..10_000u32 {
            let line = format!("{{\"n\":{n}}}\n");
            if tx.send(Ok(Bytes::from(line))).is_err() {
                break;
            }
            tokio::task::yield_now().await;
        }
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.close();
    let seen_at_close = log.lock().events.len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(log.lock().events.len(), seen_at_close);
    feeder.abort();
}

#[tokio::test]
async fn handler_can_close_its_own_stream() {
    let log = Arc::new(Mutex::new(Log::default()));
    let slot: Arc<Mutex<Option<StreamHandle>>> = Arc::new(Mutex::new(None));
    let (tx, stream) = channel_body();
    let recorder = Recorder {
        log: log.clone(),
        close_on: Some((2, slot.clone())),
    };
    let handle = StreamReader::new("self-close", recorder, ReaderConfig::default()).spawn(stream);
    *slot.lock() = Some(handle.clone());

    tx.send(Ok(Bytes::from_static(b"{\"n\":1}\n{\"n\":2}\n{\"n\":3}\n")))
        .unwrap();
    wait_done(&handle).await;

    let log = log.lock();
    assert_eq!(log.events, vec![1, 2]);
    assert!(log.ends.is_empty());
    assert!(handle.is_closed());
}
