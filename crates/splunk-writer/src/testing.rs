use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, mpsc};
use tokio::time::Instant;

use crate::buffer::{BatchBuffer, BufferConfig};
use crate::case::KeyCase;
use crate::config::{Compression, Config};
use crate::event::{Entry, Level};
use crate::sink::Sink;

#[derive(Debug, Error)]
#[error("sink rejected batch")]
pub struct Rejected;

/// One call into a test sink.
#[derive(Debug)]
pub struct Delivery<R> {
    pub records: Vec<R>,
    pub at: Instant,
}

/// Records every delivery, then fails, panics or succeeds as scripted.
pub struct ScriptedSink<R> {
    failures_left: AtomicUsize,
    panics_left: AtomicUsize,
    tx: mpsc::UnboundedSender<Delivery<R>>,
}

impl<R> ScriptedSink<R> {
    fn new(failures: usize, panics: usize) -> (Self, mpsc::UnboundedReceiver<Delivery<R>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            failures_left: AtomicUsize::new(failures),
            panics_left: AtomicUsize::new(panics),
            tx,
        };
        (sink, rx)
    }

    pub fn succeeding() -> (Self, mpsc::UnboundedReceiver<Delivery<R>>) {
        Self::new(0, 0)
    }

    pub fn failing_first(n: usize) -> (Self, mpsc::UnboundedReceiver<Delivery<R>>) {
        Self::new(n, 0)
    }

    pub fn always_failing() -> (Self, mpsc::UnboundedReceiver<Delivery<R>>) {
        Self::new(usize::MAX, 0)
    }

    pub fn panicking_first(n: usize) -> (Self, mpsc::UnboundedReceiver<Delivery<R>>) {
        Self::new(0, n)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl<R: Clone + Send + Sync + 'static> Sink<R> for ScriptedSink<R> {
    type Error = Rejected;

    async fn deliver(&self, records: &[R]) -> Result<(), Rejected> {
        let _ = self.tx.send(Delivery {
            records: records.to_vec(),
            at: Instant::now(),
        });
        if take_one(&self.panics_left) {
            panic!("scripted sink panic");
        }
        if take_one(&self.failures_left) {
            return Err(Rejected);
        }
        Ok(())
    }
}

/// Blocks every delivery until a permit is released through `gate`.
pub struct GatedSink<R> {
    pub gate: std::sync::Arc<Semaphore>,
    tx: mpsc::UnboundedSender<Delivery<R>>,
}

impl<R> GatedSink<R> {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Delivery<R>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = Self {
            gate: std::sync::Arc::new(Semaphore::new(0)),
            tx,
        };
        (sink, rx)
    }
}

impl<R: Clone + Send + Sync + 'static> Sink<R> for GatedSink<R> {
    type Error = Rejected;

    async fn deliver(&self, records: &[R]) -> Result<(), Rejected> {
        let permit = self.gate.acquire().await.map_err(|_| Rejected)?;
        permit.forget();
        let _ = self.tx.send(Delivery {
            records: records.to_vec(),
            at: Instant::now(),
        });
        Ok(())
    }
}

pub fn buffer_config(capacity: usize, queue_depth: usize) -> BufferConfig {
    BufferConfig {
        capacity,
        queue_depth,
        flush_interval: Duration::from_secs(60),
        backoff: Duration::from_millis(10),
    }
}

/// Poll until nothing is buffered or in flight.
pub async fn wait_idle<R: Send + Sync + 'static>(buffer: &BatchBuffer<R>) {
    while !buffer.stats().is_idle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

pub fn dummy_config(endpoint: &str) -> Config {
    let _ = rustls::crypto::ring::default_provider().install_default();
    Config {
        endpoint: url::Url::parse(endpoint).unwrap(),
        token: None,
        minimum_level: Level::Debug,
        timeout: Duration::from_millis(500),
        compression: Compression::None,
        key_case: KeyCase::Preserve,
        buffer: buffer_config(10, 3),
        message_envelope: None,
        event_fields: Entry::new(),
        event_properties: Entry::new(),
        app_properties: Entry::new(),
    }
}

/// A raw HTTP request as received by [`accept_request`].
pub struct RawRequest {
    pub head: String,
    pub body: Vec<u8>,
}

/// Accept a single HTTP request, answer with `status_line`, and return what
/// was received.
pub async fn accept_request(listener: TcpListener, status_line: &str) -> RawRequest {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before headers were complete");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before body was complete");
        buf.extend_from_slice(&chunk[..n]);
    }

    let response =
        format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
    stream.write_all(response.as_bytes()).await.unwrap();

    RawRequest {
        head,
        body: buf[head_end..head_end + content_length].to_vec(),
    }
}

/// Bind an ephemeral port and return the listener with its URL.
pub async fn local_endpoint() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, format!("http://127.0.0.1:{port}/services/collector"))
}
