//! Notifier implementations.

pub mod pagerduty;

use async_trait::async_trait;

use crate::build::Build;
use crate::config::NotifierConfig;
use crate::error::{ConfigError, DeliveryError};
use crate::secrets::SecretResolver;

/// A sink that turns build events into notifications.
///
/// A notifier is set up once and then receives zero or more builds.
/// Calling [`Notifier::send_notification`] before a successful
/// [`Notifier::set_up`] fails with [`DeliveryError::NotConfigured`].
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Validate `config` and resolve secrets.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] naming the step that failed. The notifier
    /// stays unconfigured.
    async fn set_up(
        &mut self,
        config: &NotifierConfig,
        secrets: &dyn SecretResolver,
    ) -> Result<(), ConfigError>;

    /// Deliver a notification for `build` if its filter matches.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::NotConfigured`] before setup, or a
    /// [`DeliveryError`] when the notification cannot be sent.
    async fn send_notification(&self, build: &Build) -> Result<(), DeliveryError>;
}
