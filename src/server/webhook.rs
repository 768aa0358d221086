//! Webhook endpoint handler.
//!
//! Accepts GitHub webhook deliveries, verifies the signature before touching
//! the payload, normalizes the delivery into a typed [`Event`], and hands it
//! to the per-key router. The endpoint acknowledges with 202 Accepted;
//! processing happens asynchronously in the routed worker.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, warn};

use crate::dispatch::events::Event;
use crate::types::DeliveryId;
use crate::worker::EventSink;

use super::AppState;
use super::signature::verify_signature;

/// Header name for the GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for the GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for the GitHub signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Errors that reject a webhook delivery.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid JSON body: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("missing repository information in payload")]
    MissingRepository,
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            WebhookError::MissingRepository => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Webhook handler.
///
/// Required headers: `X-GitHub-Event`, `X-GitHub-Delivery`,
/// `X-Hub-Signature-256`. Returns 202 for every accepted delivery, including
/// event types the queue doesn't consume (those are acknowledged and
/// dropped, so GitHub doesn't retry them).
pub async fn webhook_handler<S: EventSink>(
    State(app_state): State<AppState<S>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, &'static str), WebhookError> {
    let event_type = get_header(&headers, HEADER_EVENT)?;
    let delivery_id = DeliveryId::new(get_header(&headers, HEADER_DELIVERY)?);
    let signature_header = get_header(&headers, HEADER_SIGNATURE)?;

    debug!(delivery_id = %delivery_id, event_type = %event_type, "received webhook");

    // Verify before parsing; nothing unauthenticated gets interpreted.
    if !verify_signature(&body, &signature_header, app_state.webhook_secret()) {
        warn!(delivery_id = %delivery_id, "invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    let payload: serde_json::Value = serde_json::from_slice(&body)?;
    let (owner, repo) = extract_repository(&payload)?;

    let Some(event) = Event::from_payload(&event_type, &payload) else {
        debug!(
            delivery_id = %delivery_id,
            event_type = %event_type,
            "event type not consumed, acknowledged and dropped"
        );
        return Ok((StatusCode::ACCEPTED, "Accepted (ignored)"));
    };

    let route = format!("{owner}/{repo}");
    debug!(
        delivery_id = %delivery_id,
        route = %route,
        kind = %event.kind(),
        "routing event"
    );
    app_state.router().dispatch(&route, event).await;

    Ok((StatusCode::ACCEPTED, "Accepted"))
}

/// Extracts a required header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(WebhookError::MissingHeader(name))
}

/// Extracts repository owner and name from a webhook payload.
fn extract_repository(payload: &serde_json::Value) -> Result<(String, String), WebhookError> {
    let repository = payload
        .get("repository")
        .ok_or(WebhookError::MissingRepository)?;

    let owner = repository
        .pointer("/owner/login")
        .and_then(|l| l.as_str())
        .ok_or(WebhookError::MissingRepository)?;
    let name = repository
        .get("name")
        .and_then(|n| n.as_str())
        .ok_or(WebhookError::MissingRepository)?;

    Ok((owner.to_string(), name.to_string()))
}
