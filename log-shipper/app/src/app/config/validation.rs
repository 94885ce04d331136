use super::{Command, Config, ConfigError};
use crate::domain::{Destination, FileFormat};
use std::collections::HashSet;
use std::path::PathBuf;
use url::Url;

/// What file mode ingests, resolved against the configured bindings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTarget {
    pub destination: Destination,
    pub format: FileFormat,
    pub path: PathBuf,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate endpoint URL
        let endpoint = Url::parse(&self.endpoint).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid endpoint URL '{}': {}", self.endpoint, e))
        })?;
        if endpoint.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(format!(
                "Endpoint URL '{}' has no host",
                self.endpoint
            )));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Batch size must be greater than 0".to_string(),
            ));
        }

        if self.file_batch_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "File batch size must be greater than 0".to_string(),
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::InvalidConfig(
                "Retry max attempts must be greater than 0".to_string(),
            ));
        }

        self.validate_bindings()?;

        match &self.command {
            Command::Live => {
                if self.live_bindings().next().is_none() {
                    return Err(ConfigError::InvalidConfig(
                        "Live mode needs at least one source with a listen address".to_string(),
                    ));
                }
            }
            Command::File { .. } => {
                self.file_target()?;
            }
        }

        Ok(())
    }

    fn validate_bindings(&self) -> Result<(), ConfigError> {
        if self.bindings.is_empty() {
            return Err(ConfigError::InvalidSource(
                "No sources configured".to_string(),
            ));
        }

        let mut channels = HashSet::new();
        let mut destinations = HashSet::new();
        let mut addresses = HashSet::new();

        for binding in &self.bindings {
            if !channels.insert(binding.channel.as_str()) {
                return Err(ConfigError::InvalidSource(format!(
                    "Duplicate channel '{}'",
                    binding.channel
                )));
            }
            if !destinations.insert(binding.destination.as_str().to_lowercase()) {
                return Err(ConfigError::InvalidSource(format!(
                    "Duplicate destination '{}'",
                    binding.destination
                )));
            }
            if let Some(listen) = &binding.listen
                && !addresses.insert(listen.to_string())
            {
                return Err(ConfigError::InvalidSource(format!(
                    "Listen address {listen} is used by more than one channel"
                )));
            }
        }

        Ok(())
    }

    /// Resolves the file-mode destination; `None` outside file mode.
    pub fn file_target(&self) -> Result<Option<FileTarget>, ConfigError> {
        let Command::File {
            destination,
            format,
            path,
        } = &self.command
        else {
            return Ok(None);
        };

        let binding = self
            .find_binding(destination)
            .ok_or_else(|| ConfigError::UnknownDestination {
                destination: destination.clone(),
                valid: self.destination_names().join(", "),
            })?;

        Ok(Some(FileTarget {
            destination: binding.destination.clone(),
            format: format.unwrap_or(binding.file_format),
            path: path.clone(),
        }))
    }
}
