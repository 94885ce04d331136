use super::config::CredentialsSection;
use super::config::serde_helpers::lookup_non_empty;
use crate::sender::RequestSigner;
use std::fmt;
use thiserror::Error;

pub const ACCESS_ID_VAR: &str = "LOG_SHIPPER_ACCESS_ID";
pub const ACCESS_SECRET_VAR: &str = "LOG_SHIPPER_ACCESS_SECRET";
pub const PROJECT_VAR: &str = "LOG_SHIPPER_PROJECT";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("Missing credential: set {variable} or `{key}` in the [credentials] table")]
    Missing {
        variable: &'static str,
        key: &'static str,
    },
}

/// Account used to sign every request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_id: String,
    pub access_secret: String,
    pub project: String,
}

impl Credentials {
    /// Reads credentials through `lookup` (normally the process environment),
    /// falling back to the `[credentials]` table for each value.
    pub fn load<F>(lookup: F, section: &CredentialsSection) -> Result<Self, CredentialsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolve = |variable: &'static str, key: &'static str, fallback: &Option<String>| {
            lookup_non_empty(&lookup, variable)
                .or_else(|| {
                    fallback
                        .as_deref()
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                })
                .ok_or(CredentialsError::Missing { variable, key })
        };

        Ok(Self {
            access_id: resolve(ACCESS_ID_VAR, "access_id", &section.access_id)?,
            access_secret: resolve(ACCESS_SECRET_VAR, "access_secret", &section.access_secret)?,
            project: resolve(PROJECT_VAR, "project", &section.project)?,
        })
    }

    pub fn from_env(section: &CredentialsSection) -> Result<Self, CredentialsError> {
        Self::load(|name| std::env::var(name).ok(), section)
    }

    pub fn signer(&self) -> RequestSigner {
        RequestSigner::new(self.access_id.clone(), self.access_secret.clone())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_id", &self.access_id)
            .field("access_secret", &"<redacted>")
            .field("project", &self.project)
            .finish()
    }
}
