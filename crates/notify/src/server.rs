//! HTTP server receiving build events as Pub/Sub push messages.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::build::Build;
use crate::Notifier;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Configured notifier every decoded build is handed to.
    pub notifier: Arc<dyn Notifier>,
}

/// Build the HTTP router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(handle_push))
        .route("/health", get(health_check))
        .with_state(state)
}

/// Pub/Sub push request body.
#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    pub message: PubSubMessage,
    #[serde(default)]
    pub subscription: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubSubMessage {
    /// Base64-encoded build JSON
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

/// Reasons a push message cannot be turned into a build.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("invalid push envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("message data is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("message data is not a valid build: {0}")]
    Build(#[source] serde_json::Error),
}

impl PushEnvelope {
    /// Parse a push request body.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Envelope`] if the body is not a push envelope.
    pub fn from_slice(body: &[u8]) -> Result<Self, PushError> {
        serde_json::from_slice(body).map_err(PushError::Envelope)
    }
}

impl PubSubMessage {
    /// Decode the build carried in `data`.
    ///
    /// # Errors
    ///
    /// Returns [`PushError::Base64`] if `data` is not valid base64, or
    /// [`PushError::Build`] if it does not hold a build.
    pub fn decode_build(&self) -> Result<Build, PushError> {
        let raw = base64::engine::general_purpose::STANDARD.decode(self.data.as_bytes())?;
        serde_json::from_slice(&raw).map_err(PushError::Build)
    }
}

/// Decode a push message and hand the build to the notifier.
async fn handle_push(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<Value>) {
    let envelope = match PushEnvelope::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => return bad_request(&e),
    };

    debug!(
        message_id = %envelope.message.message_id,
        subscription = %envelope.subscription,
        "Received push message"
    );

    let build = match envelope.message.decode_build() {
        Ok(build) => build,
        Err(e) => return bad_request(&e),
    };

    match state.notifier.send_notification(&build).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            error!(
                notifier = state.notifier.name(),
                build_id = %build.id,
                error = %e,
                "Failed to send notification"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}

fn bad_request(e: &PushError) -> (StatusCode, Json<Value>) {
    warn!(error = %e, "Rejecting push message");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": e.to_string() })),
    )
}

/// Health check endpoint.
async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}
