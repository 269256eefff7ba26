use serde_json::Value;
use tracing::trace;

use crate::buffer::{BatchBuffer, BufferStats};
use crate::config::Config;
use crate::event::{Entry, Level, LogRecord, format_message};
use crate::sink::Sink;
use crate::splunk::{ExportError, SplunkSink};

/// Turns log records into HEC lines and hands them to a [`BatchBuffer`].
///
/// `write` never blocks on the network and never reports delivery
/// failures; those end up in the `tracing` output.
pub struct Writer {
    buffer: BatchBuffer<Entry>,
    minimum_level: Level,
    message_envelope: Option<String>,
    event_fields: Entry,
    event_properties: Entry,
    app_properties: Entry,
}

impl Writer {
    /// Writer shipping to the Splunk endpoint in `config`.
    ///
    /// Must be called from within a Tokio runtime, after a rustls
    /// `CryptoProvider` has been installed.
    pub fn new(config: &Config) -> Result<Self, ExportError> {
        Ok(Self::with_sink(config, SplunkSink::new(config)?))
    }

    pub fn with_sink<S: Sink<Entry>>(config: &Config, sink: S) -> Self {
        Self {
            buffer: BatchBuffer::new(config.buffer, sink),
            minimum_level: config.minimum_level,
            message_envelope: config.message_envelope.clone(),
            event_fields: config.event_fields.clone(),
            event_properties: config.event_properties.clone(),
            app_properties: config.app_properties.clone(),
        }
    }

    pub fn write(&self, record: LogRecord) {
        if record.level > self.minimum_level {
            trace!(level = %record.level, "record below minimum level");
            return;
        }
        self.buffer.write(self.line(record));
    }

    pub fn flush(&self) {
        self.buffer.flush();
    }

    pub fn stats(&self) -> BufferStats {
        self.buffer.stats()
    }

    /// One HEC line: the configured top-level fields plus the `event`.
    fn line(&self, record: LogRecord) -> Entry {
        let properties = Entry::normalize(
            record
                .args
                .into_iter()
                .chain([Value::from(self.app_properties.clone())]),
        );
        let message = format_message(
            &record.message,
            &properties,
            self.message_envelope.as_deref(),
        );

        let mut body = Entry::new();
        body.add("AdditionalData", properties)
            .add("Message", message)
            .add("Severity", record.level.severity());
        let event = Entry::normalize([body.into(), self.event_properties.clone().into()]);

        let mut line = Entry::normalize([self.event_fields.clone().into()]);
        line.add("event", event);
        line
    }
}
