pub mod config;
pub mod credentials;
pub mod host;
pub mod logging_system;
pub mod service;
pub mod shutdown;

pub use config::{Command, Config, ConfigError, FileTarget, LogFormat, LogLevel};
pub use credentials::{Credentials, CredentialsError};
pub use logging_system::{LoggingError, setup_logging};
pub use service::{FileRunSummary, LiveSummary, ServiceError, run_file, run_live};

use crate::sender::{HttpTransport, Topic, TransportConfig};
use anyhow::Context;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct App {
    config: Config,
    credentials: Credentials,
}

impl App {
    pub fn from_args<I, T>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = Config::from_args(args)?;
        Self::from_config(config)
    }

    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let credentials =
            Credentials::from_env(&config.credentials).context("Failed to load credentials")?;
        Ok(Self {
            config,
            credentials,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn transport(&self) -> anyhow::Result<HttpTransport> {
        let transport_config = TransportConfig {
            endpoint: self.config.endpoint.clone(),
            project: self.credentials.project.clone(),
            timeout: self.config.request_timeout,
            ..TransportConfig::default()
        };
        HttpTransport::new(transport_config, self.credentials.signer())
            .context("Failed to build HTTP transport")
    }

    /// Runs the selected mode. File mode reports failure through the exit
    /// code when any batch was dropped.
    pub async fn run(self) -> anyhow::Result<ExitCode> {
        let transport = self.transport()?;
        info!(
            "Delivering to {} (project {})",
            transport.base_url(),
            self.credentials.project
        );

        match self.config.file_target()? {
            Some(target) => {
                let encoder = service::envelope_encoder(&self.config, Topic::FileMode);
                let summary = run_file(&self.config, target, encoder, transport).await?;
                if summary.is_complete() {
                    Ok(ExitCode::SUCCESS)
                } else {
                    error!(
                        "{} batches ({} records) could not be delivered",
                        summary.delivery.batches_failed, summary.delivery.records_dropped
                    );
                    Ok(ExitCode::FAILURE)
                }
            }
            None => {
                let shutdown = CancellationToken::new();
                let watcher = shutdown::spawn_signal_watcher(shutdown.clone());
                let encoder = service::envelope_encoder(&self.config, Topic::StreamMode);

                info!("log-shipper is running. Press Ctrl+C to stop.");
                let summary = run_live(&self.config, encoder, transport, shutdown.clone()).await;
                shutdown.cancel();
                let _ = watcher.await;

                let summary = summary?;
                info!(
                    "log-shipper stopped after {} dispatch cycles ({} records skipped)",
                    summary.dispatch.cycles, summary.normalizer.skipped
                );
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

// Main entry point for the application
pub async fn main() -> ExitCode {
    let config = match Config::from_args(std::env::args_os()) {
        Ok(config) => config,
        // --help, --version and usage errors print and exit the clap way
        Err(ConfigError::Cli(e)) => e.exit(),
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_logging(config.log_level, config.log_format) {
        eprintln!("Warning: {e}");
    }
    info!("Starting log-shipper v{}", get_version());

    let app = match App::from_config(config) {
        Ok(app) => app,
        Err(e) => {
            error!("Startup error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    match app.run().await {
        Ok(code) => code,
        Err(e) => {
            error!("Application error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
