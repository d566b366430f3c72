//! Error types for notifier setup and delivery.

use thiserror::Error;

/// Errors raised while setting a notifier up.
///
/// All of these are fatal: the host is expected to abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config document is not valid YAML or has the wrong shape
    #[error("failed to parse notifier config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Config declares an API version this notifier does not understand
    #[error("unsupported config apiVersion {found:?}, expected {expected:?}")]
    UnsupportedApiVersion {
        found: String,
        expected: &'static str,
    },

    /// Filter expression did not compile
    #[error("failed to create filter predicate: {0}")]
    Filter(#[from] FilterError),

    /// Delivery block is missing a required field or has the wrong type
    #[error("expected delivery config to have {0}")]
    Delivery(String),

    /// Delivery field does not hold a usable secret reference
    #[error("failed to get secret ref from delivery config field {field:?}: {reason}")]
    SecretRef { field: String, reason: String },

    /// Secret reference is not declared in `spec.secrets`
    #[error("failed to find secret for ref {0:?}")]
    SecretNotDeclared(String),

    /// Secret resolver could not produce a value
    #[error("failed to get {field} secret: {source}")]
    Secret {
        field: String,
        #[source]
        source: SecretError,
    },
}

/// Errors raised while dispatching one notification.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// `send_notification` called before a successful `set_up`
    #[error("notifier is not configured")]
    NotConfigured,

    /// Event could not be encoded
    #[error("failed to serialize incident request: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Request could not be built or the transport failed
    #[error("failed to make HTTP request: {0}")]
    Http(#[from] reqwest::Error),
}

/// Errors returned by a [`crate::secrets::SecretResolver`].
#[derive(Debug, Error)]
pub enum SecretError {
    /// No secret exists under that resource name
    #[error("secret {0:?} not found")]
    NotFound(String),

    /// Secret exists but holds an empty value
    #[error("secret {0:?} is empty")]
    Empty(String),

    /// Resource name does not follow the expected layout
    #[error("malformed secret resource name {0:?}")]
    MalformedName(String),

    /// Reading the backing store failed
    #[error("failed to read secret {name:?}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while compiling a filter expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterError {
    #[error("filter expression is empty")]
    Empty,

    #[error("unexpected character {ch:?} at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("unterminated string literal starting at offset {0}")]
    UnterminatedString(usize),

    #[error("invalid integer literal {0:?}")]
    InvalidInteger(String),

    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedToken {
        found: String,
        expected: &'static str,
        offset: usize,
    },

    #[error("unknown identifier {0:?}")]
    UnknownIdentifier(String),

    #[error("unknown build field {0:?}")]
    UnknownField(String),

    #[error("unknown build status {0:?}")]
    UnknownStatus(String),

    #[error("unknown method {0:?}")]
    UnknownMethod(String),

    #[error("method {method} expects {expected} argument(s), got {found}")]
    Arity {
        method: String,
        expected: usize,
        found: usize,
    },

    #[error("invalid regular expression {pattern:?}: {reason}")]
    InvalidRegex { pattern: String, reason: String },
}
