use std::time::Duration;

use splunk_writer::config::Compression;
use splunk_writer::{BufferConfig, Config, Entry, Level};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Stand-in for a Splunk HTTP Event Collector on an ephemeral port.
pub struct FakeCollector {
    listener: TcpListener,
    pub endpoint: String,
}

impl FakeCollector {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Self {
            listener,
            endpoint: format!("http://127.0.0.1:{port}/services/collector"),
        }
    }

    /// Answer the next request with `status_line` and return its JSON body.
    pub async fn respond(&self, status_line: &str) -> serde_json::Value {
        let (mut stream, _) = self.listener.accept().await.unwrap();
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
        let head = String::from_utf8_lossy(&buf[..head_end]).to_ascii_lowercase();
        let content_length: usize = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);
        while buf.len() < head_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "connection closed before body was complete");
            buf.extend_from_slice(&chunk[..n]);
        }

        let response =
            format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
        stream.write_all(response.as_bytes()).await.unwrap();

        serde_json::from_slice(&buf[head_end..head_end + content_length]).unwrap()
    }

    pub fn config(&self, buffer: BufferConfig) -> Config {
        let _ = rustls::crypto::ring::default_provider().install_default();
        Config {
            endpoint: url::Url::parse(&self.endpoint).unwrap(),
            token: Some("integration-token".into()),
            minimum_level: Level::Debug,
            timeout: Duration::from_secs(2),
            compression: Compression::None,
            key_case: Default::default(),
            buffer,
            message_envelope: None,
            event_fields: Entry::new(),
            event_properties: Entry::new(),
            app_properties: Entry::new(),
        }
    }
}
