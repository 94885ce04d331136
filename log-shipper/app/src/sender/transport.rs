use super::envelope::EncodedBatch;
use super::signer::{RequestSigner, SIGNATURE_METHOD, SignatureInput, http_date};
use super::stats::ClientStats;
use crate::domain::Destination;
use chrono::Utc;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, DATE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, ClientBuilder, StatusCode};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use url::{Host, Url};

pub const API_VERSION: &str = "0.6.0";
pub const CONTENT_TYPE_PROTOBUF: &str = "application/x-protobuf";

const CONTENT_MD5: &str = "content-md5";
const X_LOG_APIVERSION: &str = "x-log-apiversion";
const X_LOG_BODYRAWSIZE: &str = "x-log-bodyrawsize";
const X_LOG_COMPRESSTYPE: &str = "x-log-compresstype";
const X_LOG_SIGNATUREMETHOD: &str = "x-log-signaturemethod";

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(#[from] reqwest::Error),
    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(String),
}

/// Result of one delivery attempt, or of a whole delivery once terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    RetryableFailure(String),
    FatalFailure(String),
}

impl DeliveryOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DeliveryOutcome::Delivered)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, DeliveryOutcome::RetryableFailure(_))
    }
}

/// One "append batch" call against the remote store.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    pub batch_id: String,
    pub destination: Destination,
    pub records: usize,
    pub payload: EncodedBatch,
}

/// The single remote operation the pipeline needs.
pub trait Transport: Send + Sync {
    fn append(&self, request: &AppendRequest) -> impl Future<Output = DeliveryOutcome> + Send;
}

/// Maps an HTTP status to an outcome.
pub fn classify_status(status: StatusCode) -> DeliveryOutcome {
    if status.is_success() {
        DeliveryOutcome::Delivered
    } else if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        DeliveryOutcome::RetryableFailure(format!("HTTP {status}"))
    } else {
        DeliveryOutcome::FatalFailure(format!("HTTP {status}"))
    }
}

fn classify_error(error: &reqwest::Error) -> DeliveryOutcome {
    if error.is_builder() {
        DeliveryOutcome::FatalFailure(format!("Invalid request: {error}"))
    } else {
        DeliveryOutcome::RetryableFailure(format!("Transport error: {error}"))
    }
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub endpoint: String,
    pub project: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://cn-hangzhou.log.aliyuncs.com".to_string(),
            project: String::new(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("log-shipper/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// `reqwest` implementation of [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    user_agent: String,
    signer: RequestSigner,
    stats: Arc<ClientStats>,
}

impl HttpTransport {
    pub fn new(config: TransportConfig, signer: RequestSigner) -> Result<Self, TransportError> {
        let endpoint: Url = config
            .endpoint
            .parse()
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {e}", config.endpoint)))?;
        let base_url = project_url(&endpoint, &config.project)?;

        let client = ClientBuilder::new()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self {
            client,
            base_url,
            user_agent: config.user_agent,
            signer,
            stats: Arc::new(ClientStats::new()),
        })
    }

    pub fn stats(&self) -> Arc<ClientStats> {
        self.stats.clone()
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn url_for(&self, destination: &Destination) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(&resource_path(destination));
        url
    }

    pub fn build_headers(&self, request: &AppendRequest) -> Result<HeaderMap, TransportError> {
        let payload = &request.payload;
        let date = http_date(Utc::now());
        let log_headers = [
            (X_LOG_APIVERSION, API_VERSION.to_string()),
            (X_LOG_BODYRAWSIZE, payload.raw_size.to_string()),
            (X_LOG_COMPRESSTYPE, payload.compression.as_str().to_string()),
            (X_LOG_SIGNATUREMETHOD, SIGNATURE_METHOD.to_string()),
        ];
        let resource = resource_path(&request.destination);
        let authorization = self.signer.authorization(&SignatureInput {
            method: "POST",
            content_md5: &payload.checksum,
            content_type: CONTENT_TYPE_PROTOBUF,
            date: &date,
            headers: &log_headers,
            resource: &resource,
        });

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(CONTENT_TYPE_PROTOBUF));
        headers.insert(
            HeaderName::from_static(CONTENT_MD5),
            header_value(&payload.checksum)?,
        );
        headers.insert(DATE, header_value(&date)?);
        headers.insert(USER_AGENT, header_value(&self.user_agent)?);
        headers.insert(
            HeaderName::from_static(X_LOG_APIVERSION),
            HeaderValue::from_static(API_VERSION),
        );
        headers.insert(
            HeaderName::from_static(X_LOG_BODYRAWSIZE),
            header_value(&payload.raw_size.to_string())?,
        );
        headers.insert(
            HeaderName::from_static(X_LOG_COMPRESSTYPE),
            HeaderValue::from_static(payload.compression.as_str()),
        );
        headers.insert(
            HeaderName::from_static(X_LOG_SIGNATUREMETHOD),
            HeaderValue::from_static(SIGNATURE_METHOD),
        );
        headers.insert(AUTHORIZATION, header_value(&authorization)?);
        Ok(headers)
    }
}

impl Transport for HttpTransport {
    async fn append(&self, request: &AppendRequest) -> DeliveryOutcome {
        let headers = match self.build_headers(request) {
            Ok(headers) => headers,
            Err(e) => return DeliveryOutcome::FatalFailure(e.to_string()),
        };
        let url = self.url_for(&request.destination);
        let bytes = request.payload.body.len() as u64;
        let start = Instant::now();

        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(request.payload.body.clone())
            .send()
            .await;

        let outcome = match response {
            Ok(response) => {
                let status = response.status();
                match classify_status(status) {
                    DeliveryOutcome::Delivered => DeliveryOutcome::Delivered,
                    failure => {
                        let detail = response.text().await.unwrap_or_default();
                        let detail: String = detail.chars().take(256).collect();
                        tracing::debug!(
                            "Batch {} rejected with HTTP {}: {}",
                            request.batch_id,
                            status,
                            detail
                        );
                        match failure {
                            DeliveryOutcome::RetryableFailure(reason) if !detail.is_empty() => {
                                DeliveryOutcome::RetryableFailure(format!("{reason}: {detail}"))
                            }
                            DeliveryOutcome::FatalFailure(reason) if !detail.is_empty() => {
                                DeliveryOutcome::FatalFailure(format!("{reason}: {detail}"))
                            }
                            other => other,
                        }
                    }
                }
            }
            Err(e) => classify_error(&e),
        };

        self.stats
            .record_request(outcome.is_delivered(), bytes, start.elapsed());
        outcome
    }
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|e| TransportError::InvalidHeaderValue(format!("{value:?}: {e}")))
}

fn resource_path(destination: &Destination) -> String {
    format!("/logstores/{destination}")
}

/// Prefixes the endpoint host with the project name, as the service expects,
/// unless the host is an IP literal or `localhost`.
pub fn project_url(endpoint: &Url, project: &str) -> Result<Url, TransportError> {
    let host = match endpoint.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => return Ok(endpoint.clone()),
        None => {
            return Err(TransportError::InvalidEndpoint(format!(
                "{endpoint} has no host"
            )));
        }
    };

    if project.is_empty() || host.eq_ignore_ascii_case("localhost") {
        return Ok(endpoint.clone());
    }

    let mut url = endpoint.clone();
    url.set_host(Some(&format!("{project}.{host}")))
        .map_err(|e| TransportError::InvalidEndpoint(format!("{project}.{host}: {e}")))?;
    Ok(url)
}
