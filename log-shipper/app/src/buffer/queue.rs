use crate::domain::CanonicalRecord;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, mpsc};

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Delivery queue is closed")]
    Closed,
}

/// Counters shared by every producer and the consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueMetrics {
    pub len: usize,
    pub pushed: u64,
    pub popped: u64,
    pub peak_size: usize,
}

#[derive(Debug)]
struct Shared {
    current_len: AtomicUsize,
    pushed: AtomicU64,
    popped: AtomicU64,
    peak_size: AtomicUsize,
    wake_threshold: usize,
    threshold_reached: Notify,
}

impl Shared {
    // Helper method to update peak size atomically
    fn update_peak_size(&self, current_size: usize) {
        let mut peak = self.peak_size.load(Ordering::Relaxed);
        while current_size > peak {
            match self.peak_size.compare_exchange_weak(
                peak,
                current_size,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => peak = x,
            }
        }
    }
}

/// Creates the unbounded delivery queue.
///
/// The producer half is cloned into every source; the consumer half belongs to
/// the single dispatcher. `wake_threshold` is the queue length at which a
/// waiting consumer is woken before its poll interval elapses.
pub fn delivery_queue(wake_threshold: usize) -> (QueueProducer, QueueConsumer) {
    let (tx, rx) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared {
        current_len: AtomicUsize::new(0),
        pushed: AtomicU64::new(0),
        popped: AtomicU64::new(0),
        peak_size: AtomicUsize::new(0),
        wake_threshold: wake_threshold.max(1),
        threshold_reached: Notify::new(),
    });

    (
        QueueProducer {
            tx,
            shared: shared.clone(),
        },
        QueueConsumer { rx, shared },
    )
}

/// Multi-producer enqueue handle.
#[derive(Debug, Clone)]
pub struct QueueProducer {
    tx: mpsc::UnboundedSender<CanonicalRecord>,
    shared: Arc<Shared>,
}

impl QueueProducer {
    pub fn enqueue(&self, record: CanonicalRecord) -> Result<(), QueueError> {
        let len = self.shared.current_len.fetch_add(1, Ordering::AcqRel) + 1;
        if self.tx.send(record).is_err() {
            self.shared.current_len.fetch_sub(1, Ordering::AcqRel);
            return Err(QueueError::Closed);
        }

        self.shared.pushed.fetch_add(1, Ordering::Relaxed);
        self.shared.update_peak_size(len);
        if len == self.shared.wake_threshold {
            self.shared.threshold_reached.notify_one();
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.shared.current_len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Single-consumer drain handle.
#[derive(Debug)]
pub struct QueueConsumer {
    rx: mpsc::UnboundedReceiver<CanonicalRecord>,
    shared: Arc<Shared>,
}

impl QueueConsumer {
    pub fn len(&self) -> usize {
        self.shared.current_len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the records present when the call starts, in enqueue order.
    /// Records enqueued while draining stay for the next call.
    pub fn drain(&mut self) -> Vec<CanonicalRecord> {
        let available = self.len();
        let mut records = Vec::with_capacity(available);

        while records.len() < available {
            match self.rx.try_recv() {
                Ok(record) => records.push(record),
                Err(_) => break,
            }
        }

        if !records.is_empty() {
            self.shared
                .current_len
                .fetch_sub(records.len(), Ordering::AcqRel);
            self.shared
                .popped
                .fetch_add(records.len() as u64, Ordering::Relaxed);
        }
        records
    }

    /// Waits until the queue reaches the wake threshold or `max_wait`
    /// elapses, whichever comes first.
    pub async fn wait_for_records(&self, max_wait: Duration) {
        if self.len() >= self.shared.wake_threshold {
            return;
        }
        let _ = tokio::time::timeout(max_wait, self.shared.threshold_reached.notified()).await;
    }

    pub fn wake_threshold(&self) -> usize {
        self.shared.wake_threshold
    }

    pub fn metrics(&self) -> QueueMetrics {
        QueueMetrics {
            len: self.len(),
            pushed: self.shared.pushed.load(Ordering::Relaxed),
            popped: self.shared.popped.load(Ordering::Relaxed),
            peak_size: self.shared.peak_size.load(Ordering::Relaxed),
        }
    }
}
