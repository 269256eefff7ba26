use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{Batch, Counters};
use crate::sink::Sink;

/// Drains the dispatch queue, one delivery at a time.
pub(super) struct DeliveryWorker<R, S> {
    pub(super) queue: mpsc::Receiver<Batch<R>>,
    pub(super) requeue: mpsc::Sender<Batch<R>>,
    pub(super) sink: Arc<S>,
    pub(super) backoff: Duration,
    pub(super) counters: Arc<Counters>,
    pub(super) cancel: CancellationToken,
}

impl<R, S> DeliveryWorker<R, S>
where
    R: Send + Sync + 'static,
    S: Sink<R>,
{
    pub(super) async fn run(mut self) {
        loop {
            let batch = tokio::select! {
                _ = self.cancel.cancelled() => break,
                batch = self.queue.recv() => match batch {
                    Some(batch) => batch,
                    None => break,
                },
            };
            self.deliver(batch).await;
        }
        debug!("delivery worker stopped");
    }

    /// Run one delivery on its own task so a panicking sink only costs this
    /// batch an attempt instead of taking the worker down.
    async fn deliver(&self, batch: Batch<R>) {
        let sink = Arc::clone(&self.sink);
        let records = Arc::clone(&batch.records);
        let outcome = tokio::spawn(async move { sink.deliver(&records).await }).await;

        match outcome {
            Ok(Ok(())) => {
                debug!(records = batch.records.len(), "batch delivered");
                self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(Err(e)) => {
                warn!(error = %e, records = batch.records.len(), "batch delivery failed");
                self.retry(batch);
            }
            Err(e) => {
                error!(error = %e, records = batch.records.len(), "batch delivery task panicked");
                self.retry(batch);
            }
        }
    }

    /// Spend one attempt. Re-queue after the backoff if any are left,
    /// otherwise drop the batch.
    fn retry(&self, mut batch: Batch<R>) {
        batch.remaining_attempts = batch.remaining_attempts.saturating_sub(1);
        if batch.remaining_attempts == 0 {
            error!(
                records = batch.records.len(),
                "dropping batch after exhausting delivery attempts"
            );
            self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        self.counters.pending_retries.fetch_add(1, Ordering::SeqCst);
        let queue = self.requeue.clone();
        let counters = Arc::clone(&self.counters);
        let cancel = self.cancel.clone();
        let backoff = self.backoff;
        tokio::spawn(async move {
            let requeued = tokio::select! {
                _ = cancel.cancelled() => false,
                sent = async {
                    tokio::time::sleep(backoff).await;
                    queue.send(batch).await
                } => sent.is_ok(),
            };
            counters.pending_retries.fetch_sub(1, Ordering::SeqCst);
            if !requeued {
                debug!("buffer shut down before batch was retried");
                counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        });
    }
}
