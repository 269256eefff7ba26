//! Batched, retrying log shipping to a Splunk HTTP Event Collector.
//!
//! [`BatchBuffer`] is the delivery engine: records accumulate into batches
//! that are flushed by size or by time and delivered to a [`Sink`] by a
//! single background worker, with a fixed backoff between attempts.
//! [`Writer`] sits on top of it and turns [`LogRecord`]s into HEC events.

pub mod buffer;
pub mod case;
pub mod config;
pub mod event;
pub mod sink;
pub mod splunk;
pub mod writer;

#[cfg(test)]
mod testing;

pub use buffer::{BatchBuffer, BufferConfig, BufferStats};
pub use config::{Config, ConfigError};
pub use event::{Entry, Level, LogRecord};
pub use sink::Sink;
pub use splunk::{ExportError, SplunkSink};
pub use writer::Writer;
