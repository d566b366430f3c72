//! Build event notifications for `PagerDuty`.
//!
//! This crate forwards CI build events to the `PagerDuty` Events API v2.
//! A notifier is set up once from a YAML config, then decides per build
//! whether to trigger an incident using a compiled filter expression.
//!
//! # Usage
//!
//! ```no_run
//! use build_notify::{Build, EnvSecretResolver, Notifier, NotifierConfig, PagerDutyNotifier};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = NotifierConfig::load("pagerduty.yaml")?;
//!
//! let mut notifier = PagerDutyNotifier::new();
//! notifier.set_up(&config, &EnvSecretResolver::new()).await?;
//!
//! let build: Build = serde_json::from_str(r#"{"id": "b1", "status": "FAILURE"}"#)?;
//! notifier.send_notification(&build).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`Notifier`] is the setup/send interface a host drives
//! - [`PagerDutyNotifier`] implements it on top of an injected `reqwest` client
//! - [`filter::CelPredicate`] compiles the filter expression
//! - [`secrets::SecretResolver`] resolves the integration key
//! - [`server`] hosts a notifier behind a Pub/Sub push endpoint

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod build;
pub mod config;
pub mod error;
pub mod filter;
pub mod notifiers;
pub mod secrets;
pub mod server;
pub mod telemetry;

pub use build::{Build, BuildStatus};
pub use config::NotifierConfig;
pub use error::{ConfigError, DeliveryError, FilterError, SecretError};
pub use filter::{CelPredicate, EventFilter};
pub use notifiers::pagerduty::PagerDutyNotifier;
pub use notifiers::Notifier;
pub use secrets::{EnvSecretResolver, FileSecretResolver, SecretResolver, StaticSecretResolver};
