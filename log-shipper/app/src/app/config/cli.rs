use super::groups::{CredentialsSection, FileConfig, RetryConfig, SourceSection, default_sources};
use super::serde_helpers::merge_default;
use super::{ConfigError, LogFormat, LogLevel};
use crate::domain::{Destination, FileFormat, ListenAddress, SourceBinding};
use crate::sender::Compression;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_ENDPOINT: &str = "https://cn-hangzhou.log.aliyuncs.com";
pub const DEFAULT_BATCH_SIZE: usize = 4096;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;
pub const DEFAULT_FILE_BATCH_SIZE: usize = 5000;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Parser, Debug, Clone)]
#[command(name = "log-shipper", author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, env = "LOG_SHIPPER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log service endpoint URL
    #[arg(long, env = "LOG_SHIPPER_ENDPOINT", default_value = DEFAULT_ENDPOINT, global = true)]
    pub endpoint: String,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Maximum records per live batch; also wakes the dispatcher early
    #[arg(long, env = "LOG_SHIPPER_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE, global = true)]
    pub batch_size: usize,

    /// Dispatcher idle wait in milliseconds
    #[arg(long, env = "LOG_SHIPPER_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL_MS, global = true)]
    pub poll_interval_ms: u64,

    /// Records per batch in file mode
    #[arg(long, env = "LOG_SHIPPER_FILE_BATCH_SIZE", default_value_t = DEFAULT_FILE_BATCH_SIZE, global = true)]
    pub file_batch_size: usize,

    /// Envelope compression (lz4 or deflate)
    #[arg(long, env = "LOG_SHIPPER_COMPRESSION", default_value = "lz4", global = true)]
    pub compression: Compression,

    /// Do not attach host environment tags to batches
    #[arg(long, env = "LOG_SHIPPER_NO_HOST_TAGS", global = true)]
    pub no_host_tags: bool,

    /// Per-request timeout in seconds
    #[arg(long, env = "LOG_SHIPPER_REQUEST_TIMEOUT_SECS", default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS, global = true)]
    pub request_timeout_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Listen on every configured channel and ship records until interrupted
    Live,
    /// Ship a single file to one destination and exit
    File {
        /// Destination (log store) name, case-insensitive
        #[arg(long, short)]
        destination: String,

        /// File layout; defaults to the destination's configured format
        #[arg(long, short)]
        format: Option<FileFormat>,

        /// File to ingest
        path: PathBuf,
    },
}

/// Fully resolved configuration: CLI and environment, then the TOML file for
/// anything left at its default.
#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub config_file: Option<PathBuf>,
    pub endpoint: String,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    pub batch_size: usize,
    pub poll_interval_ms: u64,
    pub file_batch_size: usize,
    pub compression: Compression,
    pub host_tags: bool,
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
    pub sources: Vec<SourceSection>,
    pub credentials: CredentialsSection,

    /// Derived in `post_process`
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub bindings: Vec<SourceBinding>,
}

impl Config {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args)?;
        Self::from_cli(cli)
    }

    pub fn from_cli(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => Some(Self::read_file(path)?),
            None => None,
        };
        let mut config = Self::merge(cli, file.unwrap_or_default());
        config.post_process()?;
        config.validate()?;
        Ok(config)
    }

    pub fn read_file<P: AsRef<Path>>(path: P) -> Result<FileConfig, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn merge(cli: Cli, file: FileConfig) -> Self {
        let mut config = Config {
            command: cli.command,
            config_file: cli.config,
            endpoint: cli.endpoint,
            log_level: cli.log_level,
            log_format: cli.log_format,
            batch_size: cli.batch_size,
            poll_interval_ms: cli.poll_interval_ms,
            file_batch_size: cli.file_batch_size,
            compression: cli.compression,
            host_tags: !cli.no_host_tags,
            request_timeout_secs: cli.request_timeout_secs,
            retry: file.retry.unwrap_or_default(),
            sources: file.sources.unwrap_or_else(default_sources),
            credentials: file.credentials.unwrap_or_default(),
            poll_interval: Duration::ZERO,
            request_timeout: Duration::ZERO,
            bindings: Vec::new(),
        };

        merge_default(&mut config.endpoint, DEFAULT_ENDPOINT.to_string(), file.endpoint);
        merge_default(&mut config.log_level, LogLevel::Info, file.log_level);
        merge_default(&mut config.log_format, LogFormat::Text, file.log_format);
        merge_default(&mut config.batch_size, DEFAULT_BATCH_SIZE, file.batch_size);
        merge_default(
            &mut config.poll_interval_ms,
            DEFAULT_POLL_INTERVAL_MS,
            file.poll_interval_ms,
        );
        merge_default(
            &mut config.file_batch_size,
            DEFAULT_FILE_BATCH_SIZE,
            file.file_batch_size,
        );
        merge_default(&mut config.compression, Compression::Lz4, file.compression);
        merge_default(&mut config.host_tags, true, file.host_tags);
        merge_default(
            &mut config.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT_SECS,
            file.request_timeout_secs,
        );
        config
    }

    pub fn post_process(&mut self) -> Result<(), ConfigError> {
        self.poll_interval = Duration::from_millis(self.poll_interval_ms);
        self.request_timeout = Duration::from_secs(self.request_timeout_secs);
        self.bindings = self
            .sources
            .iter()
            .map(resolve_source)
            .collect::<Result<_, _>>()?;
        Ok(())
    }

    /// Bindings that accept live peers.
    pub fn live_bindings(&self) -> impl Iterator<Item = &SourceBinding> {
        self.bindings.iter().filter(|b| b.listen.is_some())
    }

    /// Looks up a configured destination, ignoring case.
    pub fn find_binding(&self, destination: &str) -> Option<&SourceBinding> {
        let wanted = destination.trim().trim_start_matches('/');
        self.bindings
            .iter()
            .find(|b| b.destination.as_str().eq_ignore_ascii_case(wanted))
    }

    pub fn destination_names(&self) -> Vec<&str> {
        self.bindings.iter().map(|b| b.destination.as_str()).collect()
    }
}

fn resolve_source(section: &SourceSection) -> Result<SourceBinding, ConfigError> {
    let invalid = |reason: String| {
        ConfigError::InvalidSource(format!("channel '{}': {reason}", section.channel))
    };

    let destination = Destination::new(&section.destination).map_err(|e| invalid(e.to_string()))?;
    let listen = section
        .listen
        .as_deref()
        .map(str::parse::<ListenAddress>)
        .transpose()
        .map_err(invalid)?;
    let file_format = section
        .format
        .as_deref()
        .map(str::parse::<FileFormat>)
        .transpose()
        .map_err(|e| invalid(e.to_string()))?
        .unwrap_or_default();

    SourceBinding::new(section.channel.clone(), destination, listen, file_format)
        .map_err(|e| invalid(e.to_string()))
}
