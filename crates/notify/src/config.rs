//! Notifier configuration file.
//!
//! The file is a YAML document shared by every notifier kind:
//!
//! ```yaml
//! apiVersion: cloud-build-notifiers/v1
//! kind: PagerDutyNotifier
//! metadata:
//!   name: example-pagerduty-notifier
//! spec:
//!   notification:
//!     filter: build.status == Build.Status.FAILURE
//!     delivery:
//!       incidentTitle: Build failed
//!       integrationKey:
//!         secretRef: pagerduty-key
//!   secrets:
//!     - name: pagerduty-key
//!       value: projects/my-project/secrets/pagerduty/versions/latest
//! ```
//!
//! `delivery` is kept as a raw mapping here; each notifier parses the shape
//! it needs during setup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::ConfigError;

/// The only config `apiVersion` this crate accepts.
pub const API_VERSION: &str = "cloud-build-notifiers/v1";

/// Top-level notifier configuration document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierConfig {
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: Metadata,
    pub spec: Spec,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spec {
    pub notification: Notification,
    #[serde(default)]
    pub secrets: Vec<SecretConfig>,
}

/// Which builds to notify on and where to deliver them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub filter: String,
    #[serde(default)]
    pub delivery: serde_yaml::Mapping,
}

/// A named pointer to a secret resource, e.g. a Secret Manager version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretConfig {
    #[serde(rename = "name")]
    pub local_name: String,
    #[serde(rename = "value")]
    pub resource_name: String,
}

impl NotifierConfig {
    /// Read and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise
    /// anything [`NotifierConfig::from_yaml`] returns.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        debug!(path = %path.display(), "Loaded notifier config");
        Self::from_yaml(&contents)
    }

    /// Parse and validate a config document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed YAML and
    /// [`ConfigError::UnsupportedApiVersion`] for any `apiVersion` other
    /// than [`API_VERSION`].
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.api_version != API_VERSION {
            return Err(ConfigError::UnsupportedApiVersion {
                found: self.api_version.clone(),
                expected: API_VERSION,
            });
        }
        Ok(())
    }

    /// Filter expression from `spec.notification.filter`.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.spec.notification.filter
    }

    /// Raw delivery block from `spec.notification.delivery`.
    #[must_use]
    pub fn delivery(&self) -> &serde_yaml::Mapping {
        &self.spec.notification.delivery
    }
}
