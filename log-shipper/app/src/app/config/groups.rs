use super::{LogFormat, LogLevel};
use crate::sender::{Compression, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    #[serde(rename = "delay_ms", with = "super::serde_helpers")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_attempts: policy.max_attempts,
            delay: policy.delay,
        }
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts,
            delay: config.delay,
        }
    }
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceSection {
    pub channel: String,
    pub destination: String,
    /// `unix:/path` or `tcp:host:port`; omitted for file-only destinations.
    pub listen: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

/// `[credentials]` table. Environment variables take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsSection {
    pub access_id: Option<String>,
    pub access_secret: Option<String>,
    pub project: Option<String>,
}

/// Everything the TOML file may set. Absent keys keep the CLI value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub endpoint: Option<String>,
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
    pub batch_size: Option<usize>,
    pub poll_interval_ms: Option<u64>,
    pub file_batch_size: Option<usize>,
    pub compression: Option<Compression>,
    pub host_tags: Option<bool>,
    pub request_timeout_secs: Option<u64>,
    pub retry: Option<RetryConfig>,
    pub sources: Option<Vec<SourceSection>>,
    pub credentials: Option<CredentialsSection>,
}

pub const DEFAULT_SOCKET_DIR: &str = "/tmp/log-shipper";

/// Channel bindings used when the config file declares no `[[sources]]`.
pub fn default_sources() -> Vec<SourceSection> {
    let live = |channel: &str, destination: &str, format: &str| SourceSection {
        channel: channel.to_string(),
        destination: destination.to_string(),
        listen: Some(format!("unix:{DEFAULT_SOCKET_DIR}/{channel}.sock")),
        format: Some(format.to_string()),
    };

    vec![
        live("CpuInfoPipe", "cpuinfolog", "csv"),
        live("DispatcherLogPipe", "dispatcherlog", "bracketed"),
        live("DispatcherCSVPipe", "dispatchercsv", "csv"),
        live("mlscenariocsvPipe", "mlscenariocsv", "csv"),
        SourceSection {
            channel: "AutoTestResult".to_string(),
            destination: "autotestlog".to_string(),
            listen: None,
            format: Some("stamped-csv".to_string()),
        },
    ]
}
