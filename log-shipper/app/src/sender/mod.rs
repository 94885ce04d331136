pub mod client;
pub mod envelope;
pub mod signer;
pub mod stats;
pub mod transport;

pub use client::{DeliveryClient, DeliveryReport, RetryPolicy};
pub use envelope::{
    Compression, EncodedBatch, EnvelopeEncoder, EnvelopeError, Log, LogContent, LogGroup, LogTag,
    Topic,
};
pub use signer::{RequestSigner, SignatureInput, http_date};
pub use stats::{ClientStats, ClientStatsSnapshot, DeliverySnapshot, DeliveryStats};
pub use transport::{
    AppendRequest, DeliveryOutcome, HttpTransport, Transport, TransportConfig, TransportError,
    classify_status, project_url,
};
