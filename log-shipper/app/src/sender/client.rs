use super::envelope::EnvelopeEncoder;
use super::stats::DeliveryStats;
use super::transport::{AppendRequest, DeliveryOutcome, Transport};
use crate::buffer::Batch;
use crate::domain::Destination;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Fixed-delay retry bound for retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(2),
        }
    }
}

/// Terminal result of delivering one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub batch_id: String,
    pub destination: Destination,
    pub records: usize,
    pub attempts: u32,
    pub outcome: DeliveryOutcome,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        self.outcome.is_delivered()
    }
}

/// Encodes a batch once and pushes it through the transport, retrying
/// retryable failures per [`RetryPolicy`].
pub struct DeliveryClient<T> {
    transport: T,
    encoder: EnvelopeEncoder,
    policy: RetryPolicy,
    stats: Arc<DeliveryStats>,
}

impl<T: Transport> DeliveryClient<T> {
    pub fn new(transport: T, encoder: EnvelopeEncoder, policy: RetryPolicy) -> Self {
        Self {
            transport,
            encoder,
            policy,
            stats: Arc::new(DeliveryStats::new()),
        }
    }

    /// Shares counters with another client, e.g. live and file mode clients.
    pub fn with_stats(mut self, stats: Arc<DeliveryStats>) -> Self {
        self.stats = stats;
        self
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        self.stats.clone()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn deliver(&self, batch: &Batch) -> DeliveryReport {
        let records = batch.size();
        let mut report = DeliveryReport {
            batch_id: batch.id().to_string(),
            destination: batch.destination().clone(),
            records,
            attempts: 0,
            outcome: DeliveryOutcome::Delivered,
        };

        let payload = match self.encoder.encode(batch) {
            Ok(payload) => payload,
            Err(e) => {
                report.outcome = DeliveryOutcome::FatalFailure(format!("Encoding failed: {e}"));
                self.finish(&report);
                return report;
            }
        };

        let request = AppendRequest {
            batch_id: report.batch_id.clone(),
            destination: report.destination.clone(),
            records,
            payload,
        };
        let max_attempts = self.policy.max_attempts.max(1);

        loop {
            report.attempts += 1;
            self.stats.record_attempt();
            debug!(
                "Sending batch {} to {} ({} records, attempt {}/{})",
                report.batch_id, report.destination, records, report.attempts, max_attempts
            );

            match self.transport.append(&request).await {
                DeliveryOutcome::RetryableFailure(reason) if report.attempts < max_attempts => {
                    warn!(
                        "Batch {} to {} failed (attempt {}/{}): {}; retrying in {:?}",
                        report.batch_id,
                        report.destination,
                        report.attempts,
                        max_attempts,
                        reason,
                        self.policy.delay
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                outcome => {
                    report.outcome = outcome;
                    break;
                }
            }
        }

        self.finish(&report);
        report
    }

    fn finish(&self, report: &DeliveryReport) {
        match &report.outcome {
            DeliveryOutcome::Delivered => {
                self.stats.record_delivered(report.records);
                info!(
                    "Delivered {} records to {} (batch {}, {} attempts)",
                    report.records, report.destination, report.batch_id, report.attempts
                );
            }
            DeliveryOutcome::RetryableFailure(reason) | DeliveryOutcome::FatalFailure(reason) => {
                self.stats.record_dropped(report.records);
                error!(
                    "Dropped {} records for {} (batch {}) after {} attempts: {}",
                    report.records, report.destination, report.batch_id, report.attempts, reason
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CanonicalRecord, EnvironmentTags, Fields};
    use crate::sender::envelope::{Compression, Topic};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays scripted outcomes; repeats the last one when the script runs out.
    struct ScriptedTransport {
        script: Mutex<VecDeque<DeliveryOutcome>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(script: Vec<DeliveryOutcome>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl Transport for ScriptedTransport {
        async fn append(&self, _request: &AppendRequest) -> DeliveryOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.pop_front().unwrap()
            } else {
                script.front().cloned().unwrap()
            }
        }
    }

    fn client(script: Vec<DeliveryOutcome>) -> DeliveryClient<ScriptedTransport> {
        DeliveryClient::new(
            ScriptedTransport::new(script),
            EnvelopeEncoder::new(
                Topic::StreamMode,
                "host",
                EnvironmentTags::new(),
                Compression::Lz4,
            ),
            RetryPolicy::default(),
        )
    }

    fn batch() -> Batch {
        let dest = Destination::new("cpuinfolog").unwrap();
        let fields: Fields = [("cpu", "1")].into_iter().collect();
        Batch::new(
            dest.clone(),
            vec![CanonicalRecord::new(dest, Some(1_700_000_000), fields)],
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_retryable_failure_stops_after_five_attempts() {
        let client = client(vec![DeliveryOutcome::RetryableFailure("reset".into())]);
        let started = tokio::time::Instant::now();

        let report = client.deliver(&batch()).await;

        assert_eq!(report.attempts, 5);
        assert_eq!(client.transport().calls.load(Ordering::SeqCst), 5);
        assert!(report.outcome.is_retryable());
        assert_eq!(started.elapsed(), Duration::from_secs(8));
        assert_eq!(client.stats().snapshot().records_dropped, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_failure_is_not_retried() {
        let client = client(vec![DeliveryOutcome::FatalFailure("HTTP 401".into())]);

        let report = client.deliver(&batch()).await;

        assert_eq!(report.attempts, 1);
        assert_eq!(client.transport().calls.load(Ordering::SeqCst), 1);
        assert!(matches!(report.outcome, DeliveryOutcome::FatalFailure(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_retry() {
        let client = client(vec![
            DeliveryOutcome::RetryableFailure("503".into()),
            DeliveryOutcome::Delivered,
        ]);

        let report = client.deliver(&batch()).await;

        assert!(report.is_delivered());
        assert_eq!(report.attempts, 2);
        let stats = client.stats().snapshot();
        assert_eq!(stats.records_delivered, 1);
        assert_eq!(stats.attempts, 2);
    }

    #[tokio::test]
    async fn test_far_future_record_does_not_sink_its_batch() {
        let client = client(vec![DeliveryOutcome::Delivered]);
        let dest = Destination::new("cpuinfolog").unwrap();
        let records: Vec<_> = [
            "Timestamp=1700000000,cpu=1",
            "Timestamp=5000000000,cpu=2",
            "cpu=3",
        ]
        .into_iter()
        .filter_map(|line| crate::parser::normalize_key_value(line, &dest))
        .collect();
        let batch = Batch::new(dest, records);

        let report = client.deliver(&batch).await;

        assert!(report.is_delivered());
        assert_eq!(report.attempts, 1);
        assert_eq!(report.records, 3);
        assert_eq!(client.stats().snapshot().records_delivered, 3);
    }

    #[tokio::test]
    async fn test_empty_batch_fails_without_sending() {
        let client = client(vec![DeliveryOutcome::Delivered]);
        let empty = Batch::new(Destination::new("x").unwrap(), vec![]);

        let report = client.deliver(&empty).await;

        assert_eq!(report.attempts, 0);
        assert_eq!(client.transport().calls.load(Ordering::SeqCst), 0);
        assert!(matches!(report.outcome, DeliveryOutcome::FatalFailure(_)));
    }
}
