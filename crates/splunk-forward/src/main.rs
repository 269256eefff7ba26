use std::time::Duration;

use splunk_writer::{Config, LogRecord, Writer};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 30_000;

/// Unrecoverable startup failure: log it and exit.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("SPLUNK_WRITER_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid SPLUNK_WRITER_LOG_LEVEL: {val:?}, defaulting to WARN");
                None
            })
        })
        .unwrap_or(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

fn drain_timeout() -> Duration {
    let ms = std::env::var("SPLUNK_FORWARD_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|val| {
            val.parse().ok().or_else(|| {
                warn!(value = %val, "invalid SPLUNK_FORWARD_DRAIN_TIMEOUT_MS, using default");
                None
            })
        })
        .unwrap_or(DEFAULT_DRAIN_TIMEOUT_MS);
    Duration::from_millis(ms)
}

/// Flush what is buffered and give in-flight batches until `timeout` to land.
async fn drain(writer: &Writer, timeout: Duration) {
    writer.flush();
    let deadline = Instant::now() + timeout;
    loop {
        let stats = writer.stats();
        if stats.is_idle() {
            debug!("all batches settled");
            return;
        }
        if Instant::now() >= deadline {
            warn!(
                in_flight = stats.in_flight,
                pending_retries = stats.pending_retries,
                "drain timed out, abandoning undelivered batches"
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn setup_rustls() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls ring provider");
}

#[tokio::main]
async fn main() {
    setup_logging();
    setup_rustls();

    let config = Config::from_env().unwrap_or_else(|e| fatal("config error", &e));
    let writer = Writer::new(&config).unwrap_or_else(|e| fatal("failed to build HTTP client", &e));
    info!(endpoint = %config.endpoint, "forwarding stdin to splunk");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut forwarded = 0u64;
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<LogRecord>(&line) {
                Ok(record) => {
                    writer.write(record);
                    forwarded += 1;
                }
                Err(e) => warn!(error = %e, "skipping malformed log record"),
            },
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read stdin");
                break;
            }
        }
    }

    debug!(forwarded, "stdin closed");
    drain(&writer, drain_timeout()).await;
}
