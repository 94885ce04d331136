//! Queue consumer that turns drained records into per-destination deliveries.

use crate::buffer::{DestinationGroup, QueueConsumer, group_by_destination};
use crate::parser::RecordNormalizer;
use crate::sender::{DeliveryClient, DeliveryReport, Transport};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Largest batch sent in one request; also the queue length that wakes
    /// an idle dispatcher early.
    pub batch_size: usize,
    /// Idle wait when the queue is empty.
    pub poll_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_size: 4096,
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// What one drain-and-deliver pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub records: usize,
    pub destinations: usize,
    pub batches_delivered: usize,
    pub batches_failed: usize,
}

impl CycleSummary {
    fn from_reports(records: usize, destinations: usize, reports: &[DeliveryReport]) -> Self {
        let delivered = reports.iter().filter(|r| r.is_delivered()).count();
        Self {
            records,
            destinations,
            batches_delivered: delivered,
            batches_failed: reports.len() - delivered,
        }
    }
}

/// Running totals over every cycle of a dispatcher's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchTotals {
    pub cycles: u64,
    pub records: u64,
    pub batches_delivered: u64,
    pub batches_failed: u64,
}

impl DispatchTotals {
    pub fn add(&mut self, cycle: &CycleSummary) {
        self.cycles += 1;
        self.records += cycle.records as u64;
        self.batches_delivered += cycle.batches_delivered as u64;
        self.batches_failed += cycle.batches_failed as u64;
    }
}

pub struct BatchDispatcher<T> {
    consumer: QueueConsumer,
    client: Arc<DeliveryClient<T>>,
    config: DispatcherConfig,
    cancel: CancellationToken,
    normalizer: Option<Arc<RecordNormalizer>>,
    reported_skips: u64,
}

impl<T: Transport> BatchDispatcher<T> {
    pub fn new(
        consumer: QueueConsumer,
        client: Arc<DeliveryClient<T>>,
        config: DispatcherConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            consumer,
            client,
            config,
            cancel,
            normalizer: None,
            reported_skips: 0,
        }
    }

    /// Reports the normalizer's skip count once per cycle.
    pub fn with_normalizer(mut self, normalizer: Arc<RecordNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Runs until cancelled, then makes one final pass over whatever is
    /// still queued.
    pub async fn run(mut self) -> DispatchTotals {
        info!(
            "Starting dispatcher (batch_size={}, poll_interval={:?})",
            self.config.batch_size, self.config.poll_interval
        );
        let mut totals = DispatchTotals::default();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if self.consumer.is_empty() {
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = self.consumer.wait_for_records(self.config.poll_interval) => {}
                }
                continue;
            }
            let cycle = self.dispatch_cycle().await;
            totals.add(&cycle);
        }

        if !self.consumer.is_empty() {
            info!("Flushing {} queued records before shutdown", self.consumer.len());
            let cycle = self.dispatch_cycle().await;
            totals.add(&cycle);
        }

        let stats = self.client.stats().snapshot();
        info!(
            "Dispatcher stopped: {} batches delivered ({} records), {} batches dropped ({} records)",
            stats.batches_delivered,
            stats.records_delivered,
            stats.batches_failed,
            stats.records_dropped
        );
        totals
    }

    /// Drains everything queued right now and delivers it.
    pub async fn dispatch_cycle(&mut self) -> CycleSummary {
        let records = self.consumer.drain();
        let record_count = records.len();
        let groups = group_by_destination(records, self.config.batch_size);
        let destinations = groups.len();

        let reports: Vec<DeliveryReport> = join_all(groups.iter().map(|g| self.deliver_group(g)))
            .await
            .into_iter()
            .flatten()
            .collect();

        let summary = CycleSummary::from_reports(record_count, destinations, &reports);
        info!(
            "Dispatch cycle: {} records for {} destinations, {} batches delivered, {} failed",
            summary.records, summary.destinations, summary.batches_delivered, summary.batches_failed
        );
        self.report_skips();
        summary
    }

    /// Batches of one destination go out strictly one after another.
    async fn deliver_group(&self, group: &DestinationGroup) -> Vec<DeliveryReport> {
        debug!(
            "Delivering {} records to {} in {} batches",
            group.record_count(),
            group.destination,
            group.batches.len()
        );
        let mut reports = Vec::with_capacity(group.batches.len());
        for batch in &group.batches {
            reports.push(self.client.deliver(batch).await);
        }
        reports
    }

    fn report_skips(&mut self) {
        let Some(normalizer) = &self.normalizer else {
            return;
        };
        let skipped = normalizer.snapshot().skipped;
        if skipped > self.reported_skips {
            info!(
                "Skipped {} malformed inputs since last cycle",
                skipped - self.reported_skips
            );
            self.reported_skips = skipped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::delivery_queue;
    use crate::domain::{CanonicalRecord, Destination, EnvironmentTags, Fields};
    use crate::sender::{
        AppendRequest, Compression, DeliveryOutcome, EnvelopeEncoder, LogGroup, RetryPolicy, Topic,
    };
    use parking_lot::Mutex;
    use prost::Message;

    /// Records the `seq` field of every record it receives, per call.
    #[derive(Default)]
    struct RecordingTransport {
        calls: Mutex<Vec<(String, Vec<String>)>>,
        fail_destination: Option<&'static str>,
    }

    impl Transport for RecordingTransport {
        async fn append(&self, request: &AppendRequest) -> DeliveryOutcome {
            if self.fail_destination == Some(request.destination.as_str()) {
                return DeliveryOutcome::FatalFailure("HTTP 403".into());
            }
            let raw = lz4_flex::block::decompress(&request.payload.body, request.payload.raw_size)
                .unwrap();
            let group = LogGroup::decode(raw.as_slice()).unwrap();
            let seqs = group
                .logs
                .iter()
                .map(|log| log.contents[0].value.clone())
                .collect();
            self.calls
                .lock()
                .push((request.destination.to_string(), seqs));
            DeliveryOutcome::Delivered
        }
    }

    fn client(transport: RecordingTransport) -> Arc<DeliveryClient<RecordingTransport>> {
        Arc::new(DeliveryClient::new(
            transport,
            EnvelopeEncoder::new(Topic::StreamMode, "h", EnvironmentTags::new(), Compression::Lz4),
            RetryPolicy::default(),
        ))
    }

    fn record(dest: &str, seq: usize) -> CanonicalRecord {
        let fields: Fields = [("seq", seq.to_string())].into_iter().collect();
        CanonicalRecord::new(Destination::new(dest).unwrap(), Some(1_700_000_000), fields)
    }

    fn config(batch_size: usize) -> DispatcherConfig {
        DispatcherConfig {
            batch_size,
            poll_interval: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn test_two_cycles_deliver_every_record_in_order() {
        let (producer, consumer) = delivery_queue(4096);
        let client = client(RecordingTransport::default());
        let mut dispatcher =
            BatchDispatcher::new(consumer, client.clone(), config(4096), CancellationToken::new());

        for i in 0..3 {
            producer.enqueue(record("d", i)).unwrap();
        }
        let first = dispatcher.dispatch_cycle().await;
        for i in 3..5 {
            producer.enqueue(record("d", i)).unwrap();
        }
        let second = dispatcher.dispatch_cycle().await;

        assert_eq!(first.records + second.records, 5);
        let calls = client.transport().calls.lock().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, vec!["0", "1", "2"]);
        assert_eq!(calls[1].1, vec!["3", "4"]);
    }

    #[tokio::test]
    async fn test_oversized_group_is_split_sequentially() {
        let (producer, consumer) = delivery_queue(4096);
        let client = client(RecordingTransport::default());
        let mut dispatcher =
            BatchDispatcher::new(consumer, client.clone(), config(2), CancellationToken::new());

        for i in 0..5 {
            producer.enqueue(record("d", i)).unwrap();
        }
        let summary = dispatcher.dispatch_cycle().await;

        assert_eq!(summary.batches_delivered, 3);
        let calls = client.transport().calls.lock().clone();
        let flattened: Vec<_> = calls.into_iter().flat_map(|(_, seqs)| seqs).collect();
        assert_eq!(flattened, vec!["0", "1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn test_failing_destination_does_not_block_others() {
        let (producer, consumer) = delivery_queue(4096);
        let client = client(RecordingTransport {
            fail_destination: Some("bad"),
            ..Default::default()
        });
        let mut dispatcher =
            BatchDispatcher::new(consumer, client.clone(), config(100), CancellationToken::new());

        producer.enqueue(record("bad", 0)).unwrap();
        producer.enqueue(record("good", 1)).unwrap();
        let summary = dispatcher.dispatch_cycle().await;

        assert_eq!(summary.destinations, 2);
        assert_eq!(summary.batches_delivered, 1);
        assert_eq!(summary.batches_failed, 1);
        let calls = client.transport().calls.lock().clone();
        assert_eq!(calls, vec![("good".to_string(), vec!["1".to_string()])]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_flushes_queue_on_shutdown() {
        let (producer, consumer) = delivery_queue(4096);
        let client = client(RecordingTransport::default());
        let cancel = CancellationToken::new();
        let dispatcher = BatchDispatcher::new(consumer, client.clone(), config(100), cancel.clone());

        let task = tokio::spawn(dispatcher.run());
        tokio::task::yield_now().await;
        producer.enqueue(record("d", 0)).unwrap();
        cancel.cancel();

        let totals = task.await.unwrap();
        assert_eq!(totals.records, 1);
        assert_eq!(totals.cycles, 1);
        assert_eq!(client.transport().calls.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_totals_accumulate_across_many_cycles() {
        let (producer, consumer) = delivery_queue(4096);
        let client = client(RecordingTransport::default());
        let cancel = CancellationToken::new();
        let dispatcher = BatchDispatcher::new(
            consumer,
            client.clone(),
            DispatcherConfig {
                batch_size: 100,
                poll_interval: Duration::from_millis(1),
            },
            cancel.clone(),
        );
        let task = tokio::spawn(dispatcher.run());

        for seq in 0..50 {
            producer.enqueue(record("d", seq)).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();

        let totals = task.await.unwrap();
        assert_eq!(totals.records, 50);
        assert!(totals.cycles > 1);
        assert_eq!(totals.batches_failed, 0);
        assert_eq!(totals.batches_delivered, totals.cycles);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_dispatcher_waits_for_poll_interval() {
        let (producer, consumer) = delivery_queue(4096);
        let client = client(RecordingTransport::default());
        let cancel = CancellationToken::new();
        let dispatcher = BatchDispatcher::new(consumer, client.clone(), config(4096), cancel.clone());
        let task = tokio::spawn(dispatcher.run());

        tokio::task::yield_now().await;
        producer.enqueue(record("d", 0)).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(client.transport().calls.lock().is_empty());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(client.transport().calls.lock().len(), 1);

        cancel.cancel();
        task.await.unwrap();
    }
}
