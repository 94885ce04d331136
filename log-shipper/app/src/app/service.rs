//! The two run modes: `live` (listeners, queue and dispatcher until shutdown)
//! and `file` (one file shipped to one destination).

use super::config::{Config, FileTarget};
use super::host::{collect_environment_tags, machine_name};
use crate::buffer::{Batch, BatchAccumulator, delivery_queue};
use crate::collector::{FileSourceError, FileSourceReader, ListenerError, LiveSourceListener};
use crate::dispatcher::{BatchDispatcher, DispatchTotals, DispatcherConfig};
use crate::domain::EnvironmentTags;
use crate::parser::{NormalizerSnapshot, RecordNormalizer};
use crate::sender::{DeliveryClient, DeliverySnapshot, EnvelopeEncoder, Topic, Transport};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Listener setup failed: {0}")]
    Listener(#[from] ListenerError),
    #[error("File ingestion failed: {0}")]
    File(#[from] FileSourceError),
    #[error("No live sources configured")]
    NoLiveSources,
    #[error("Task failed: {0}")]
    Task(String),
}

/// Envelope encoder for `topic` carrying this host's identity.
pub fn envelope_encoder(config: &Config, topic: Topic) -> EnvelopeEncoder {
    let tags = if config.host_tags {
        collect_environment_tags()
    } else {
        EnvironmentTags::new()
    };
    EnvelopeEncoder::new(
        topic,
        machine_name().unwrap_or_default(),
        tags,
        config.compression,
    )
}

fn dispatcher_config(config: &Config) -> DispatcherConfig {
    DispatcherConfig {
        batch_size: config.batch_size,
        poll_interval: config.poll_interval,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveSummary {
    pub dispatch: DispatchTotals,
    pub delivery: DeliverySnapshot,
    pub normalizer: NormalizerSnapshot,
}

/// Serves every live binding until `shutdown` is cancelled.
///
/// Listeners stop first; the dispatcher is stopped only after they have
/// exited so its final pass sees every record they enqueued.
pub async fn run_live<T>(
    config: &Config,
    encoder: EnvelopeEncoder,
    transport: T,
    shutdown: CancellationToken,
) -> Result<LiveSummary, ServiceError>
where
    T: Transport + 'static,
{
    let normalizer = Arc::new(RecordNormalizer::new());
    let (producer, consumer) = delivery_queue(config.batch_size);

    let mut listeners = Vec::new();
    for binding in config.live_bindings() {
        let listener = LiveSourceListener::new(
            binding.clone(),
            Arc::clone(&normalizer),
            producer.clone(),
            shutdown.clone(),
        )?;
        listeners.push(listener.spawn());
    }
    drop(producer);
    if listeners.is_empty() {
        return Err(ServiceError::NoLiveSources);
    }

    let client = Arc::new(DeliveryClient::new(
        transport,
        encoder,
        config.retry.into(),
    ));
    let dispatcher_cancel = CancellationToken::new();
    let dispatcher = BatchDispatcher::new(
        consumer,
        Arc::clone(&client),
        dispatcher_config(config),
        dispatcher_cancel.clone(),
    )
    .with_normalizer(Arc::clone(&normalizer));
    let dispatcher_task = tokio::spawn(dispatcher.run());

    info!("Serving {} live channels", listeners.len());
    shutdown.cancelled().await;

    for handle in listeners {
        if let Err(e) = handle.task.await {
            error!("Listener for channel {} panicked: {}", handle.channel, e);
        }
    }

    dispatcher_cancel.cancel();
    let dispatch = dispatcher_task
        .await
        .map_err(|e| ServiceError::Task(format!("dispatcher: {e}")))?;

    Ok(LiveSummary {
        dispatch,
        delivery: client.stats().snapshot(),
        normalizer: normalizer.snapshot(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileRunSummary {
    pub delivery: DeliverySnapshot,
    pub normalizer: NormalizerSnapshot,
}

impl FileRunSummary {
    /// True when no batch was dropped.
    pub fn is_complete(&self) -> bool {
        self.delivery.batches_failed == 0
    }
}

/// Ships one file. The reader runs on a blocking thread and hands over full
/// batches through a channel of capacity one, so at most two batches are held
/// in memory while the previous one is being delivered.
pub async fn run_file<T>(
    config: &Config,
    target: FileTarget,
    encoder: EnvelopeEncoder,
    transport: T,
) -> Result<FileRunSummary, ServiceError>
where
    T: Transport + 'static,
{
    let normalizer = Arc::new(RecordNormalizer::new());
    let client = DeliveryClient::new(transport, encoder, config.retry.into());
    let (tx, mut rx) = mpsc::channel::<Batch>(1);

    info!(
        "Shipping {} ({}) to {}",
        target.path.display(),
        target.format,
        target.destination
    );

    let batch_size = config.file_batch_size;
    let reader_normalizer = Arc::clone(&normalizer);
    let reader_task = tokio::task::spawn_blocking(move || -> Result<(), FileSourceError> {
        let reader = FileSourceReader::open(
            &target.path,
            target.destination.clone(),
            target.format,
            reader_normalizer,
        )?;
        let mut accumulator = BatchAccumulator::new(target.destination, batch_size);

        let mut result = Ok(());
        for item in reader {
            match item {
                Ok(record) => {
                    if let Some(batch) = accumulator.push(record)
                        && tx.blocking_send(batch).is_err()
                    {
                        return Ok(());
                    }
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        // Records read before a failure are still shipped.
        if let Some(batch) = accumulator.finish() {
            let _ = tx.blocking_send(batch);
        }
        result
    });

    while let Some(batch) = rx.recv().await {
        let report = client.deliver(&batch).await;
        if !report.is_delivered() {
            warn!(
                "Batch {} lost; continuing with the rest of the file",
                report.batch_id
            );
        }
    }

    reader_task
        .await
        .map_err(|e| ServiceError::Task(format!("file reader: {e}")))??;

    let summary = FileRunSummary {
        delivery: client.stats().snapshot(),
        normalizer: normalizer.snapshot(),
    };
    info!(
        "File done: {} records delivered in {} batches, {} records dropped, {} lines skipped",
        summary.delivery.records_delivered,
        summary.delivery.batches_delivered,
        summary.delivery.records_dropped,
        summary.normalizer.skipped
    );
    Ok(summary)
}
