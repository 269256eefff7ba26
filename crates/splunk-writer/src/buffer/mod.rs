use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::sink::Sink;

mod worker;

use worker::DeliveryWorker;

pub const DEFAULT_CAPACITY: usize = 100;
pub const DEFAULT_QUEUE_DEPTH: usize = 100;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(10);

/// Upper bound for `capacity`; the accumulator preallocates this many slots.
pub const MAX_CAPACITY: usize = 1 << 20;
/// Upper bound for `queue_depth`, well inside what a tokio channel accepts.
pub const MAX_QUEUE_DEPTH: usize = 1 << 20;

/// Sizing and timing for a [`BatchBuffer`]. Zero-valued fields fall back to
/// the defaults when the buffer is built, and counts above [`MAX_CAPACITY`]
/// or [`MAX_QUEUE_DEPTH`] are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferConfig {
    /// Maximum records per batch.
    pub capacity: usize,
    /// Bound of the dispatch queue. Also the number of delivery attempts
    /// each batch gets before it is dropped.
    pub queue_depth: usize,
    pub flush_interval: Duration,
    pub backoff: Duration,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl BufferConfig {
    pub fn resolved(self) -> Self {
        fn or_default<T: PartialEq + Default>(value: T, default: T) -> T {
            if value == T::default() { default } else { value }
        }
        Self {
            capacity: or_default(self.capacity, DEFAULT_CAPACITY).min(MAX_CAPACITY),
            queue_depth: or_default(self.queue_depth, DEFAULT_QUEUE_DEPTH).min(MAX_QUEUE_DEPTH),
            flush_interval: or_default(self.flush_interval, DEFAULT_FLUSH_INTERVAL),
            backoff: or_default(self.backoff, DEFAULT_BACKOFF),
        }
    }
}

/// The in-progress batch. Only ever touched under the [`BatchBuffer`] guard.
pub(crate) struct Accumulator<R> {
    capacity: usize,
    items: Vec<R>,
}

impl<R> Accumulator<R> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    /// Append a record. Returns the detached batch when this record filled it.
    pub(crate) fn push(&mut self, record: R) -> Option<Vec<R>> {
        self.items.push(record);
        if self.items.len() >= self.capacity {
            self.detach()
        } else {
            None
        }
    }

    /// Take the buffered records, leaving a fresh allocation behind so that
    /// batches in flight never share storage. `None` when nothing is buffered.
    pub(crate) fn detach(&mut self) -> Option<Vec<R>> {
        if self.items.is_empty() {
            return None;
        }
        Some(std::mem::replace(
            &mut self.items,
            Vec::with_capacity(self.capacity),
        ))
    }
}

/// A flushed group of records and the attempts it has left.
pub(crate) struct Batch<R> {
    pub(crate) records: Arc<[R]>,
    pub(crate) remaining_attempts: usize,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) in_flight: AtomicUsize,
    pub(crate) pending_retries: AtomicUsize,
}

/// Point-in-time view of a buffer's backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferStats {
    /// Records waiting in the accumulator.
    pub buffered: usize,
    /// Batches flushed but not yet delivered or dropped.
    pub in_flight: usize,
    /// Batches sleeping out their backoff before being re-queued.
    pub pending_retries: usize,
}

impl BufferStats {
    pub fn is_idle(&self) -> bool {
        self.buffered == 0 && self.in_flight == 0
    }
}

struct Shared<R> {
    accumulator: Mutex<Accumulator<R>>,
    queue: mpsc::Sender<Batch<R>>,
    runtime: Handle,
    retry_budget: usize,
    counters: Arc<Counters>,
    cancel: CancellationToken,
}

impl<R: Send + Sync + 'static> Shared<R> {
    fn lock(&self) -> MutexGuard<'_, Accumulator<R>> {
        self.accumulator.lock().unwrap_or_else(|poisoned| {
            warn!("accumulator lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn flush(&self) {
        let detached = self.lock().detach();
        if let Some(records) = detached {
            self.hand_off(records);
        }
    }

    /// Queue a detached batch on its own task so the caller never waits on
    /// a full dispatch queue.
    fn hand_off(&self, records: Vec<R>) {
        let batch = Batch {
            records: Arc::from(records),
            remaining_attempts: self.retry_budget,
        };
        self.counters.in_flight.fetch_add(1, Ordering::SeqCst);

        let queue = self.queue.clone();
        let counters = Arc::clone(&self.counters);
        let cancel = self.cancel.clone();
        self.runtime.spawn(async move {
            let queued = tokio::select! {
                _ = cancel.cancelled() => false,
                sent = queue.send(batch) => sent.is_ok(),
            };
            if !queued {
                debug!("buffer shut down before batch was queued");
                counters.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
        });
    }
}

/// Accumulates records into batches and delivers them to a [`Sink`] in the
/// background.
///
/// Batches are flushed when `capacity` records are buffered or when
/// `flush_interval` elapses, whichever comes first. Failed deliveries are
/// retried after `backoff` until the batch runs out of attempts, then the
/// batch is dropped.
///
/// The accumulator guard is a `std::sync::Mutex` that is never held across
/// an `.await`, so `write` can be called from any thread.
///
/// Dropping the buffer stops its timer, worker and retry tasks. Batches that
/// have not been delivered by then are lost.
pub struct BatchBuffer<R> {
    shared: Arc<Shared<R>>,
    cancel: CancellationToken,
}

impl<R: Send + Sync + 'static> BatchBuffer<R> {
    /// Build the buffer and spawn its timer and delivery worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new<S: Sink<R>>(config: BufferConfig, sink: S) -> Self {
        let config = config.resolved();
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::channel(config.queue_depth);

        let shared = Arc::new(Shared {
            accumulator: Mutex::new(Accumulator::new(config.capacity)),
            queue: tx.clone(),
            runtime: Handle::current(),
            retry_budget: config.queue_depth,
            counters: Arc::clone(&counters),
            cancel: cancel.clone(),
        });

        let worker = DeliveryWorker {
            queue: rx,
            requeue: tx,
            sink: Arc::new(sink),
            backoff: config.backoff,
            counters,
            cancel: cancel.clone(),
        };
        tokio::spawn(worker.run());
        tokio::spawn(run_timer(
            Arc::clone(&shared),
            config.flush_interval,
            cancel.clone(),
        ));

        Self { shared, cancel }
    }

    /// Add a record to the current batch, flushing it if it is now full.
    pub fn write(&self, record: R) {
        let full = self.shared.lock().push(record);
        if let Some(records) = full {
            self.shared.hand_off(records);
        }
    }

    /// Flush whatever is buffered without waiting for the size threshold or
    /// the timer. No-op when empty.
    pub fn flush(&self) {
        self.shared.flush();
    }

    pub fn stats(&self) -> BufferStats {
        let counters = &self.shared.counters;
        BufferStats {
            buffered: self.shared.lock().len(),
            in_flight: counters.in_flight.load(Ordering::SeqCst),
            pending_retries: counters.pending_retries.load(Ordering::SeqCst),
        }
    }
}

impl<R> Drop for BatchBuffer<R> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Bound staleness: flush on every tick even if the batch never fills.
async fn run_timer<R: Send + Sync + 'static>(
    shared: Arc<Shared<R>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => shared.flush(),
        }
    }
    debug!("flush timer stopped");
}
