//! Per-channel live ingestion.
//!
//! Each configured channel gets one [`LiveSourceListener`] running on its own
//! task. The listener accepts a single peer at a time, turns every received
//! line into a key=value record and pushes it onto the delivery queue. Any
//! fault stays local to the channel: it is logged, the listener backs off and
//! goes back to waiting for a peer.

use super::endpoint::{ChannelListener, PeerStream};
use crate::buffer::QueueProducer;
use crate::domain::{ListenAddress, SourceBinding};
use crate::parser::RecordNormalizer;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// Longest line accepted from a peer; longer lines are discarded up to the
/// next newline.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

#[derive(Error, Debug)]
pub enum ListenerError {
    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to accept peer: {0}")]
    Accept(#[source] std::io::Error),
    #[error("Failed to read from peer: {0}")]
    Read(#[source] std::io::Error),
    #[error("Delivery queue is closed")]
    QueueClosed,
    #[error("Channel {0} has no listen address")]
    NoListenAddress(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Listening,
    Connected,
    Draining,
    Stopped,
}

impl fmt::Display for ListenerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ListenerState::Listening => "listening",
            ListenerState::Connected => "connected",
            ListenerState::Draining => "draining",
            ListenerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Counts for one peer connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub lines: u64,
    pub records: u64,
    pub oversized: u64,
}

pub struct LiveSourceListener {
    binding: SourceBinding,
    address: ListenAddress,
    normalizer: Arc<RecordNormalizer>,
    queue: QueueProducer,
    cancel: CancellationToken,
    backoff: Duration,
    bound: Option<ChannelListener>,
    state: watch::Sender<ListenerState>,
}

/// Handle to a spawned listener task.
pub struct ListenerHandle {
    pub channel: String,
    pub state: watch::Receiver<ListenerState>,
    pub task: JoinHandle<()>,
}

impl LiveSourceListener {
    pub fn new(
        binding: SourceBinding,
        normalizer: Arc<RecordNormalizer>,
        queue: QueueProducer,
        cancel: CancellationToken,
    ) -> Result<Self, ListenerError> {
        let address = binding
            .listen
            .clone()
            .ok_or_else(|| ListenerError::NoListenAddress(binding.channel.clone()))?;
        let (state, _) = watch::channel(ListenerState::Listening);
        Ok(Self {
            binding,
            address,
            normalizer,
            queue,
            cancel,
            backoff: DEFAULT_RECONNECT_BACKOFF,
            bound: None,
            state,
        })
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Uses an already bound socket for the first connection cycle.
    pub fn with_listener(mut self, listener: ChannelListener) -> Self {
        self.bound = Some(listener);
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<ListenerState> {
        self.state.subscribe()
    }

    pub fn spawn(self) -> ListenerHandle {
        let channel = self.binding.channel.clone();
        let state = self.subscribe();
        let task = tokio::spawn(self.run());
        ListenerHandle {
            channel,
            state,
            task,
        }
    }

    /// Runs connection cycles until cancelled or the delivery queue closes.
    pub async fn run(mut self) {
        tracing::info!(
            "Starting listener for channel {} on {} -> {}",
            self.binding.channel,
            self.address,
            self.binding.destination
        );

        while !self.cancel.is_cancelled() {
            self.set_state(ListenerState::Listening);

            match self.connection_cycle().await {
                Ok(Some(summary)) => {
                    tracing::info!(
                        "Peer disconnected from channel {} ({} lines, {} records, {} oversized)",
                        self.binding.channel,
                        summary.lines,
                        summary.records,
                        summary.oversized
                    );
                }
                Ok(None) => break,
                Err(ListenerError::QueueClosed) => {
                    tracing::warn!(
                        "Delivery queue closed, stopping listener for channel {}",
                        self.binding.channel
                    );
                    break;
                }
                Err(e) => {
                    tracing::warn!("Listener fault on channel {}: {}", self.binding.channel, e);
                    if matches!(e, ListenerError::Accept(_)) {
                        self.bound = None;
                    }
                }
            }

            if !self.pause().await {
                break;
            }
        }

        self.set_state(ListenerState::Stopped);
        tracing::info!("Listener for channel {} stopped", self.binding.channel);
    }

    /// One `Listening -> Connected -> Draining` pass. `Ok(None)` means the
    /// listener was cancelled while waiting.
    async fn connection_cycle(&mut self) -> Result<Option<DrainSummary>, ListenerError> {
        let listener = match self.bound.take() {
            Some(listener) => listener,
            None => {
                let bind = ChannelListener::bind(&self.address);
                tokio::select! {
                    _ = self.cancel.cancelled() => return Ok(None),
                    bound = bind => bound.map_err(|source| ListenerError::Bind {
                        address: self.address.to_string(),
                        source,
                    })?,
                }
            }
        };

        let accepted = tokio::select! {
            _ = self.cancel.cancelled() => None,
            accepted = listener.accept() => Some(accepted),
        };
        self.bound = Some(listener);
        let Some(accepted) = accepted else {
            return Ok(None);
        };
        let (peer, peer_name) = accepted.map_err(ListenerError::Accept)?;

        self.set_state(ListenerState::Connected);
        tracing::info!("Peer {} connected to channel {}", peer_name, self.binding.channel);

        self.set_state(ListenerState::Draining);
        let summary = match peer {
            PeerStream::Tcp(stream) => self.drain(stream).await?,
            #[cfg(unix)]
            PeerStream::Unix(stream) => self.drain(stream).await?,
        };
        Ok(Some(summary))
    }

    async fn drain<R: AsyncRead + Unpin>(&self, stream: R) -> Result<DrainSummary, ListenerError> {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(1024);
        let mut summary = DrainSummary::default();
        let mut discarding = false;

        loop {
            buf.clear();
            let mut limited = (&mut reader).take(MAX_LINE_BYTES as u64 + 1);
            let read = tokio::select! {
                _ = self.cancel.cancelled() => return Ok(summary),
                read = limited.read_until(b'\n', &mut buf) => read.map_err(ListenerError::Read)?,
            };
            if read == 0 {
                return Ok(summary);
            }

            let terminated = buf.last() == Some(&b'\n');
            if discarding {
                discarding = !terminated;
                continue;
            }
            if !terminated && buf.len() > MAX_LINE_BYTES {
                tracing::warn!(
                    "Discarding line over {} bytes on channel {}",
                    MAX_LINE_BYTES,
                    self.binding.channel
                );
                summary.oversized += 1;
                self.normalizer.record_skip();
                discarding = true;
                continue;
            }
            summary.lines += 1;

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\n', '\r']);
            match self.normalizer.key_value(line, &self.binding.destination) {
                Some(record) => {
                    self.queue
                        .enqueue(record)
                        .map_err(|_| ListenerError::QueueClosed)?;
                    summary.records += 1;
                }
                None => tracing::debug!("Skipped line on channel {}", self.binding.channel),
            }
        }
    }

    /// Sleeps for the backoff; returns `false` if cancelled meanwhile.
    async fn pause(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(self.backoff) => true,
        }
    }

    fn set_state(&self, next: ListenerState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::debug!("Channel {} {} -> {}", self.binding.channel, previous, next);
        }
    }
}
