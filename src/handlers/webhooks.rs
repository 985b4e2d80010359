//! # Webhook Handlers
//!
//! Intake endpoint for Google Calendar push notifications. Google sends
//! notification metadata via headers:
//!
//! - `X-Goog-Channel-Id` - identifier of the notification channel
//! - `X-Goog-Channel-Token` - the token supplied at channel creation
//! - `X-Goog-Resource-State` - state change (`sync`, `exists`, ...)
//!
//! Responses: 200 on success or no-op, 400 when the channel id header is
//! missing, 401 on a token mismatch.

use axum::{extract::State, http::HeaderMap, response::Json};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::server::AppState;
use crate::sync::WebhookError;

/// Webhook accept response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAcceptResponse {
    /// Acceptance status
    pub status: String,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub async fn receive_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<WebhookAcceptResponse>, ApiError> {
    let Some(channel_id) = header_str(&headers, "x-goog-channel-id") else {
        return Err(ApiError::bad_request("Missing X-Goog-Channel-Id header"));
    };
    let channel_token = header_str(&headers, "x-goog-channel-token");
    let resource_state = header_str(&headers, "x-goog-resource-state").unwrap_or_default();

    state
        .runtime
        .webhooks
        .handle_notification(channel_id, channel_token, resource_state)
        .await
        .map_err(|err| match err {
            WebhookError::TokenMismatch => ApiError::unauthorized("Invalid channel token"),
            WebhookError::Store(store_err) => {
                error!(error = %store_err, "Webhook lookup failed");
                ApiError::internal("Failed to process notification")
            }
        })?;

    Ok(Json(WebhookAcceptResponse {
        status: "accepted".to_string(),
    }))
}
