use std::io::Write;

use flate2::write::GzEncoder;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::case::KeyCase;
use crate::config::{Compression, Config};
use crate::event::Entry;
use crate::sink::Sink;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("splunk rejected batch: {status}")]
    Rejected { status: reqwest::StatusCode },

    #[error("gzip compression failed: {0}")]
    Compression(#[from] std::io::Error),

    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Ships batches of HEC lines to a Splunk HTTP Event Collector.
pub struct SplunkSink {
    client: Client,
    endpoint: Url,
    token: Option<String>,
    compression: Compression,
    key_case: KeyCase,
}

impl SplunkSink {
    /// Build the HTTP client for `config.endpoint`.
    ///
    /// A process-wide rustls `CryptoProvider` must already be installed;
    /// the client is built without one of its own.
    pub fn new(config: &Config) -> Result<Self, ExportError> {
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            token: config.token.clone(),
            compression: config.compression,
            key_case: config.key_case,
        })
    }

    /// JSON array of lines with keys rewritten, gzipped if configured.
    fn encode(&self, records: &[Entry]) -> Result<Vec<u8>, ExportError> {
        let value = self.key_case.rewrite(serde_json::to_value(records)?);
        let body = serde_json::to_vec(&value)?;
        match self.compression {
            Compression::Gzip => Ok(compress_gzip(&body)?),
            Compression::None => Ok(body),
        }
    }
}

impl Sink<Entry> for SplunkSink {
    type Error = ExportError;

    async fn deliver(&self, records: &[Entry]) -> Result<(), ExportError> {
        let body = self.encode(records)?;

        let mut req = self
            .client
            .post(self.endpoint.clone())
            .header("content-type", "application/json");

        if self.compression == Compression::Gzip {
            req = req.header("content-encoding", "gzip");
        }

        if let Some(token) = &self.token {
            req = req.header("authorization", format!("Splunk {token}"));
        }

        let resp = req.body(body).send().await?;
        let status = resp.status();
        if status.is_success() {
            debug!(records = records.len(), %status, "batch accepted by splunk");
            Ok(())
        } else {
            Err(ExportError::Rejected { status })
        }
    }
}

fn compress_gzip(data: &[u8]) -> Result<Vec<u8>, std::io::Error> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}
