//! `PagerDuty` incident notifier.
//!
//! Triggers a `PagerDuty` incident through the Events API v2 for every build
//! that matches the configured filter.
//!
//! # Configuration
//!
//! ```yaml
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

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::build::Build;
use crate::config::NotifierConfig;
use crate::error::{ConfigError, DeliveryError};
use crate::filter::{CelPredicate, EventFilter};
use crate::secrets::{resolve_secret, SecretResolver};
use crate::Notifier;

/// `PagerDuty` Events API v2 endpoint.
pub const EVENTS_API_URL: &str = "https://events.pagerduty.com/v2/enqueue";

/// User agent sent with every request.
pub const USER_AGENT_VALUE: &str = "GCB-Notifier/0.1 (http)";

/// Delivery field holding the incident title.
const INCIDENT_TITLE_FIELD: &str = "incidentTitle";

/// Delivery field holding the integration key secret reference.
const INTEGRATION_KEY_FIELD: &str = "integrationKey";

/// Display text of the build log link attached to every incident.
const LOG_LINK_TEXT: &str = "Failing build logs";

/// Typed view of the `PagerDuty` delivery block, parsed once at setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerDutyDelivery {
    pub incident_title: String,
    /// Name of the secret ref that holds the integration key.
    pub integration_key_ref: String,
}

impl PagerDutyDelivery {
    /// Parse the delivery mapping.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Delivery`] if `incidentTitle` is missing or not
    /// a string, or [`ConfigError::SecretRef`] if `integrationKey` has no
    /// usable `secretRef`.
    pub fn from_mapping(delivery: &serde_yaml::Mapping) -> Result<Self, ConfigError> {
        let incident_title = delivery
            .get(INCIDENT_TITLE_FIELD)
            .and_then(serde_yaml::Value::as_str)
            .ok_or_else(|| {
                ConfigError::Delivery(format!("string field `{INCIDENT_TITLE_FIELD}`"))
            })?
            .to_string();

        let integration_key_ref = crate::secrets::get_secret_ref(delivery, INTEGRATION_KEY_FIELD)?;

        Ok(Self {
            incident_title,
            integration_key_ref,
        })
    }
}

/// State held once setup succeeds. Never mutated afterwards.
struct Configured {
    filter: Box<dyn EventFilter>,
    incident_title: String,
    integration_key: String,
}

/// Notifier that triggers `PagerDuty` incidents.
pub struct PagerDutyNotifier {
    client: reqwest::Client,
    endpoint: String,
    state: Option<Configured>,
}

impl PagerDutyNotifier {
    /// Create an unconfigured notifier with a default HTTP client.
    #[must_use]
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Create an unconfigured notifier that sends through `client`.
    ///
    /// Timeouts and proxies are whatever `client` was built with.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: EVENTS_API_URL.to_string(),
            state: None,
        }
    }

    /// Send events to `endpoint` instead of the public Events API.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Endpoint events are posted to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether `set_up` has completed.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.state.is_some()
    }

    /// Build the incident event for `build`.
    ///
    /// Returns `None` until the notifier is configured.
    #[must_use]
    pub fn incident_event(&self, build: &Build) -> Option<PagerDutyEvent> {
        self.state
            .as_ref()
            .map(|state| state.incident_event(build))
    }
}

impl Default for PagerDutyNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Configured {
    fn incident_event(&self, build: &Build) -> PagerDutyEvent {
        PagerDutyEvent {
            payload: EventPayload {
                summary: self.incident_title.clone(),
                severity: EventSeverity::Critical,
                source: build.console_url(),
            },
            routing_key: self.integration_key.clone(),
            event_action: EventAction::Trigger,
            links: vec![Link {
                href: build.log_url.clone(),
                text: LOG_LINK_TEXT.to_string(),
            }],
        }
    }
}

#[async_trait]
impl Notifier for PagerDutyNotifier {
    fn name(&self) -> &'static str {
        "pagerduty"
    }

    async fn set_up(
        &mut self,
        config: &NotifierConfig,
        secrets: &dyn SecretResolver,
    ) -> Result<(), ConfigError> {
        let filter = CelPredicate::compile(config.filter())?;
        let delivery = PagerDutyDelivery::from_mapping(config.delivery())?;
        let integration_key = resolve_secret(
            config,
            secrets,
            INTEGRATION_KEY_FIELD,
            &delivery.integration_key_ref,
        )
        .await?;

        info!(
            notifier = self.name(),
            filter = %filter.source(),
            incident_title = %delivery.incident_title,
            "Notifier configured"
        );

        self.state = Some(Configured {
            filter: Box::new(filter),
            incident_title: delivery.incident_title,
            integration_key,
        });
        Ok(())
    }

    async fn send_notification(&self, build: &Build) -> Result<(), DeliveryError> {
        let state = self.state.as_ref().ok_or(DeliveryError::NotConfigured)?;

        if !state.filter.apply(build) {
            debug!(
                build_id = %build.id,
                status = %build.status,
                "Not reporting an incident for event"
            );
            return Ok(());
        }

        info!(
            build_id = %build.id,
            status = %build.status,
            "Reporting an incident for event"
        );

        let event = state.incident_event(build);
        let body = serde_json::to_vec(&event)?;

        debug!(event = ?event, "Incident request body");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            warn!(
                status = %status,
                endpoint = %self.endpoint,
                body = %body,
                "Got a non-OK response status from PagerDuty"
            );
        }

        debug!(build_id = %build.id, "Sent HTTP request successfully");
        Ok(())
    }
}

// =============================================================================
// Events API v2 types
// =============================================================================

/// Request body for the Events API v2 enqueue endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagerDutyEvent {
    pub payload: EventPayload,
    /// Integration key of the target service
    pub routing_key: String,
    pub event_action: EventAction,
    pub links: Vec<Link>,
}

impl fmt::Debug for PagerDutyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagerDutyEvent")
            .field("payload", &self.payload)
            .field("routing_key", &"<redacted>")
            .field("event_action", &self.event_action)
            .field("links", &self.links)
            .finish()
    }
}

/// Human-readable incident content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    pub summary: String,
    pub severity: EventSeverity,
    pub source: String,
}

/// Reference attached to an incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub text: String,
}

/// `PagerDuty` event action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    /// Trigger a new incident or add to an existing one
    Trigger,
}

/// `PagerDuty` event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Critical,
}
