use std::collections::HashMap;
use std::env;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::buffer::{BufferConfig, MAX_CAPACITY, MAX_QUEUE_DEPTH};
use crate::case::KeyCase;
use crate::event::{Entry, Level};

const PREFIX: &str = "SPLUNK_WRITER_";

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Compression {
    Gzip,
    None,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("SPLUNK_WRITER_ENDPOINT is required but not set")]
    EndpointMissing,

    #[error("SPLUNK_WRITER_ENDPOINT is not a valid URL: {0}")]
    EndpointInvalidUrl(String),

    #[error("{0} has invalid value: {1}")]
    InvalidNumeric(String, String),

    #[error("{0} is too large: {1} (maximum {2})")]
    OutOfRange(String, usize, usize),

    #[error("SPLUNK_WRITER_COMPRESSION has invalid value: {0} (expected \"gzip\" or \"none\")")]
    InvalidCompression(String),

    #[error(
        "SPLUNK_WRITER_KEY_CASE has invalid value: {0} (expected \"preserve\", \"pascal\" or \"camel\")"
    )]
    InvalidKeyCase(String),

    #[error("SPLUNK_WRITER_MINIMUM_LEVEL has invalid value: {0}")]
    InvalidLevel(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP Event Collector URL batches are POSTed to.
    pub endpoint: Url,
    pub token: Option<String>,
    /// Records less severe than this are discarded.
    pub minimum_level: Level,
    pub timeout: Duration,
    pub compression: Compression,
    pub key_case: KeyCase,
    pub buffer: BufferConfig,
    /// Wraps every message; `%v` marks where the message goes.
    pub message_envelope: Option<String>,
    /// Top-level fields of each HEC line (`index`, `sourcetype`, ...).
    pub event_fields: Entry,
    /// Merged into every event next to `Message` and `Severity`.
    pub event_properties: Entry,
    /// Merged into every event's `AdditionalData`.
    pub app_properties: Entry,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let vars: HashMap<String, String> =
            env::vars().filter(|(k, _)| k.starts_with(PREFIX)).collect();
        Self::parse(&vars)
    }

    fn parse(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let endpoint = parse_endpoint(vars)?;
        let token = vars
            .get("SPLUNK_WRITER_TOKEN")
            .filter(|s| !s.trim().is_empty())
            .cloned();
        let minimum_level = parse_level(vars)?;
        let timeout = parse_duration_ms(vars, "SPLUNK_WRITER_TIMEOUT_MS", 5000)?;
        let compression = parse_compression(vars)?;
        let key_case = parse_key_case(vars)?;
        let buffer = BufferConfig {
            capacity: parse_count(vars, "SPLUNK_WRITER_BUFFER_CAPACITY", MAX_CAPACITY)?,
            queue_depth: parse_count(vars, "SPLUNK_WRITER_QUEUE_DEPTH", MAX_QUEUE_DEPTH)?,
            flush_interval: parse_duration_ms(vars, "SPLUNK_WRITER_FLUSH_INTERVAL_MS", 0)?,
            backoff: parse_duration_ms(vars, "SPLUNK_WRITER_BACKOFF_MS", 0)?,
        }
        .resolved();
        let message_envelope = vars
            .get("SPLUNK_WRITER_MESSAGE_ENVELOPE")
            .filter(|s| !s.is_empty())
            .cloned();

        Ok(Self {
            endpoint,
            token,
            minimum_level,
            timeout,
            compression,
            key_case,
            buffer,
            message_envelope,
            event_fields: parse_pairs(vars, "SPLUNK_WRITER_EVENT_FIELDS"),
            event_properties: parse_pairs(vars, "SPLUNK_WRITER_EVENT_PROPERTIES"),
            app_properties: parse_pairs(vars, "SPLUNK_WRITER_APP_PROPERTIES"),
        })
    }
}

fn parse_endpoint(vars: &HashMap<String, String>) -> Result<Url, ConfigError> {
    let raw = vars
        .get("SPLUNK_WRITER_ENDPOINT")
        .filter(|s| !s.is_empty())
        .ok_or(ConfigError::EndpointMissing)?;

    Url::parse(raw).map_err(|_| ConfigError::EndpointInvalidUrl(raw.clone()))
}

fn parse_level(vars: &HashMap<String, String>) -> Result<Level, ConfigError> {
    match vars.get("SPLUNK_WRITER_MINIMUM_LEVEL") {
        Some(val) => val
            .parse()
            .map_err(|_| ConfigError::InvalidLevel(val.clone())),
        None => Ok(Level::Debug),
    }
}

/// Zero and unset both mean "use the buffer default".
fn parse_count(
    vars: &HashMap<String, String>,
    name: &str,
    max: usize,
) -> Result<usize, ConfigError> {
    let Some(val) = vars.get(name) else {
        return Ok(0);
    };
    let count: usize = val
        .parse()
        .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
    if count > max {
        return Err(ConfigError::OutOfRange(name.to_owned(), count, max));
    }
    Ok(count)
}

fn parse_duration_ms(
    vars: &HashMap<String, String>,
    name: &str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(val) => {
            let ms: u64 = val
                .parse()
                .map_err(|_| ConfigError::InvalidNumeric(name.to_owned(), val.clone()))?;
            Ok(Duration::from_millis(ms))
        }
        None => Ok(Duration::from_millis(default_ms)),
    }
}

fn parse_compression(vars: &HashMap<String, String>) -> Result<Compression, ConfigError> {
    match vars.get("SPLUNK_WRITER_COMPRESSION").map(|s| s.as_str()) {
        Some("none") | None => Ok(Compression::None),
        Some("gzip") => Ok(Compression::Gzip),
        Some(other) => Err(ConfigError::InvalidCompression(other.to_owned())),
    }
}

fn parse_key_case(vars: &HashMap<String, String>) -> Result<KeyCase, ConfigError> {
    match vars.get("SPLUNK_WRITER_KEY_CASE").map(|s| s.as_str()) {
        Some("preserve") | None => Ok(KeyCase::Preserve),
        Some("pascal") => Ok(KeyCase::Pascal),
        Some("camel") => Ok(KeyCase::LowerCamel),
        Some(other) => Err(ConfigError::InvalidKeyCase(other.to_owned())),
    }
}

/// `k1=v1,k2=v2` into an entry of string values. Malformed pairs are skipped.
fn parse_pairs(vars: &HashMap<String, String>, name: &str) -> Entry {
    vars.get(name)
        .filter(|s| !s.is_empty())
        .map(|raw| {
            raw.split(',')
                .filter_map(|pair| {
                    let (k, v) = pair.split_once('=')?;
                    let k = k.trim();
                    if k.is_empty() {
                        return None;
                    }
                    Some((k.to_owned(), Value::String(v.trim().to_owned())))
                })
                .collect()
        })
        .unwrap_or_default()
}
