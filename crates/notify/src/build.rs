//! Build event types received from the CI pipeline.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Base URL of the Cloud Build console page for a single build.
const CONSOLE_BUILD_URL: &str = "https://console.cloud.google.com/cloud-build/builds";

/// Lifecycle status of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    Pending,
    Queued,
    Working,
    Success,
    Failure,
    InternalError,
    Timeout,
    Cancelled,
    Expired,
    /// Also absorbs status names this crate does not know.
    #[default]
    #[serde(other)]
    StatusUnknown,
}

impl BuildStatus {
    /// Every status, in wire order.
    pub const ALL: [Self; 10] = [
        Self::StatusUnknown,
        Self::Pending,
        Self::Queued,
        Self::Working,
        Self::Success,
        Self::Failure,
        Self::InternalError,
        Self::Timeout,
        Self::Cancelled,
        Self::Expired,
    ];

    /// Wire name of this status (e.g. `FAILURE`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StatusUnknown => "STATUS_UNKNOWN",
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Working => "WORKING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Parse a wire name. Returns `None` for anything that is not a status.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A build record as published by the CI pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    pub id: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub status: BuildStatus,
    #[serde(default)]
    pub log_url: String,
    #[serde(default)]
    pub build_trigger_id: String,
    #[serde(default)]
    pub substitutions: HashMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<String>,
}

impl Build {
    /// Console page for this build.
    #[must_use]
    pub fn console_url(&self) -> String {
        format!(
            "{CONSOLE_BUILD_URL}/{}?project={}",
            self.id, self.project_id
        )
    }

    /// Look up a substitution, e.g. `BRANCH_NAME`.
    #[must_use]
    pub fn substitution(&self, key: &str) -> Option<&str> {
        self.substitutions.get(key).map(String::as_str)
    }
}
