use std::fmt::Display;
use std::future::Future;

/// Destination for flushed batches.
///
/// A [`BatchBuffer`](crate::BatchBuffer) awaits each delivery before
/// starting the next, retries included. Implementations must still be safe
/// to call concurrently, since the `Sync` bound lets callers share one sink.
pub trait Sink<R>: Send + Sync + 'static {
    type Error: Display + Send + 'static;

    /// Ship one batch. An `Err` makes the buffer retry the batch after its
    /// backoff, for as long as the batch has attempts left.
    fn deliver(&self, records: &[R]) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
