//! Secret resolution.
//!
//! A delivery field names a secret indirectly: the field holds a
//! `secretRef`, the ref is declared in `spec.secrets` with a resource name,
//! and a [`SecretResolver`] turns the resource name into the secret value.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use crate::config::{NotifierConfig, SecretConfig};
use crate::error::{ConfigError, SecretError};

/// Key under a delivery field that holds the secret reference.
const SECRET_REF_KEY: &str = "secretRef";

/// Looks up secret values by resource name.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Fetch the secret stored under `resource_name`.
    ///
    /// # Errors
    ///
    /// Returns a [`SecretError`] if the secret is absent, empty or unreadable.
    async fn get_secret(&self, resource_name: &str) -> Result<String, SecretError>;
}

/// Read `delivery[field].secretRef`.
///
/// # Errors
///
/// Returns [`ConfigError::SecretRef`] if the field is missing, is not a
/// mapping, or has no non-empty string `secretRef`.
pub fn get_secret_ref(delivery: &serde_yaml::Mapping, field: &str) -> Result<String, ConfigError> {
    let err = |reason: &str| ConfigError::SecretRef {
        field: field.to_string(),
        reason: reason.to_string(),
    };

    let value = delivery.get(field).ok_or_else(|| err("field is missing"))?;
    let mapping = value
        .as_mapping()
        .ok_or_else(|| err("expected a mapping with a `secretRef` key"))?;
    let secret_ref = mapping
        .get(SECRET_REF_KEY)
        .ok_or_else(|| err("`secretRef` is missing"))?
        .as_str()
        .ok_or_else(|| err("`secretRef` must be a string"))?;

    if secret_ref.is_empty() {
        return Err(err("`secretRef` is empty"));
    }
    Ok(secret_ref.to_string())
}

/// Find the resource name declared for `secret_ref` in `spec.secrets`.
///
/// # Errors
///
/// Returns [`ConfigError::SecretNotDeclared`] if no entry has that name.
pub fn find_secret_resource_name<'a>(
    secrets: &'a [SecretConfig],
    secret_ref: &str,
) -> Result<&'a str, ConfigError> {
    secrets
        .iter()
        .find(|s| s.local_name == secret_ref)
        .map(|s| s.resource_name.as_str())
        .ok_or_else(|| ConfigError::SecretNotDeclared(secret_ref.to_string()))
}

/// Resolve `secret_ref`, already read from delivery field `field`, through
/// the secrets declared in `config`.
///
/// # Errors
///
/// Returns [`ConfigError::SecretNotDeclared`] if `secret_ref` is not
/// declared, or [`ConfigError::Secret`] if the resolver fails.
pub async fn resolve_secret(
    config: &NotifierConfig,
    resolver: &dyn SecretResolver,
    field: &str,
    secret_ref: &str,
) -> Result<String, ConfigError> {
    let resource_name = find_secret_resource_name(&config.spec.secrets, secret_ref)?;

    debug!(field, secret_ref = %secret_ref, resource = %resource_name, "Resolving secret");

    resolver
        .get_secret(resource_name)
        .await
        .map_err(|source| ConfigError::Secret {
            field: field.to_string(),
            source,
        })
}

/// Extract the secret id from a resource name.
///
/// `projects/p/secrets/pagerduty/versions/latest` yields `pagerduty`; a bare
/// name without slashes is returned unchanged.
///
/// # Errors
///
/// Returns [`SecretError::MalformedName`] for an empty name, or a path
/// without a non-empty segment after `secrets/`.
pub fn secret_id(resource_name: &str) -> Result<&str, SecretError> {
    if !resource_name.contains('/') {
        return if resource_name.is_empty() {
            Err(SecretError::MalformedName(resource_name.to_string()))
        } else {
            Ok(resource_name)
        };
    }

    let mut parts = resource_name.split('/');
    while let Some(part) = parts.next() {
        if part == "secrets" {
            return parts
                .next()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| SecretError::MalformedName(resource_name.to_string()));
        }
    }
    Err(SecretError::MalformedName(resource_name.to_string()))
}

/// Resolves secrets from environment variables.
///
/// The variable name is the upper-cased secret id with every
/// non-alphanumeric character replaced by `_`, behind an optional prefix:
/// `projects/p/secrets/pagerduty-key/versions/1` reads `PAGERDUTY_KEY`.
#[derive(Debug, Clone, Default)]
pub struct EnvSecretResolver {
    prefix: String,
}

impl EnvSecretResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepend `prefix` to every variable name.
    #[must_use]
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Environment variable consulted for `resource_name`.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::MalformedName`] if no secret id can be read
    /// from `resource_name`.
    pub fn var_name(&self, resource_name: &str) -> Result<String, SecretError> {
        let id: String = secret_id(resource_name)?
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        Ok(format!("{}{id}", self.prefix))
    }
}

#[async_trait]
impl SecretResolver for EnvSecretResolver {
    async fn get_secret(&self, resource_name: &str) -> Result<String, SecretError> {
        let var = self.var_name(resource_name)?;
        match std::env::var(&var) {
            Ok(value) if value.is_empty() => Err(SecretError::Empty(var)),
            Ok(value) => Ok(value),
            Err(_) => Err(SecretError::NotFound(var)),
        }
    }
}

/// Resolves secrets from files named after the secret id, as mounted by
/// Kubernetes secret volumes.
#[derive(Debug, Clone)]
pub struct FileSecretResolver {
    dir: PathBuf,
}

impl FileSecretResolver {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl SecretResolver for FileSecretResolver {
    async fn get_secret(&self, resource_name: &str) -> Result<String, SecretError> {
        let path = self.dir.join(secret_id(resource_name)?);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SecretError::NotFound(path.display().to_string()));
            }
            Err(source) => {
                return Err(SecretError::Io {
                    name: path.display().to_string(),
                    source,
                });
            }
        };

        let value = contents
            .strip_suffix("\r\n")
            .or_else(|| contents.strip_suffix('\n'))
            .unwrap_or(&contents);
        if value.is_empty() {
            return Err(SecretError::Empty(path.display().to_string()));
        }
        Ok(value.to_string())
    }
}

/// In-memory resolver keyed by full resource name.
#[derive(Debug, Clone, Default)]
pub struct StaticSecretResolver {
    secrets: HashMap<String, String>,
}

impl StaticSecretResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_secret(mut self, resource_name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(resource_name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretResolver for StaticSecretResolver {
    async fn get_secret(&self, resource_name: &str) -> Result<String, SecretError> {
        self.secrets
            .get(resource_name)
            .cloned()
            .ok_or_else(|| SecretError::NotFound(resource_name.to_string()))
    }
}
