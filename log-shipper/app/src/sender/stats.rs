// Lock-free delivery statistics using atomic operations

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Per-request counters kept by the HTTP transport.
#[derive(Debug, Default)]
pub struct ClientStats {
    total_requests: AtomicU64,
    successful_requests: AtomicU64,
    failed_requests: AtomicU64,
    bytes_sent: AtomicU64,
    total_response_time_ms: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStatsSnapshot {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub bytes_sent: u64,
    pub average_response_time: Duration,
}

impl ClientStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, success: bool, bytes: u64, response_time: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes, Ordering::Relaxed);
        self.total_response_time_ms
            .fetch_add(response_time.as_millis() as u64, Ordering::Relaxed);

        if success {
            self.successful_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> ClientStatsSnapshot {
        let total = self.total_requests.load(Ordering::Relaxed);
        let total_ms = self.total_response_time_ms.load(Ordering::Relaxed);
        ClientStatsSnapshot {
            total_requests: total,
            successful_requests: self.successful_requests.load(Ordering::Relaxed),
            failed_requests: self.failed_requests.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            average_response_time: if total == 0 {
                Duration::ZERO
            } else {
                Duration::from_millis(total_ms / total)
            },
        }
    }
}

/// Batch-level counters kept by the delivery client.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    batches_delivered: AtomicU64,
    batches_failed: AtomicU64,
    records_delivered: AtomicU64,
    records_dropped: AtomicU64,
    attempts: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliverySnapshot {
    pub batches_delivered: u64,
    pub batches_failed: u64,
    pub records_delivered: u64,
    pub records_dropped: u64,
    pub attempts: u64,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, records: usize) {
        self.batches_delivered.fetch_add(1, Ordering::Relaxed);
        self.records_delivered
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn record_dropped(&self, records: usize) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
        self.records_dropped
            .fetch_add(records as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DeliverySnapshot {
        DeliverySnapshot {
            batches_delivered: self.batches_delivered.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
        }
    }
}
