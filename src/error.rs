//! # Error Handling
//!
//! Unified error taxonomy for the sync core plus the problem+json HTTP
//! responder used by the API surface.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Outcome of an outbound Google Calendar call, classified for retry and
/// state-machine handling. Produced by the API client, consumed by the
/// retry controller and the sync engine.
#[derive(Debug, Clone, Error)]
pub enum GoogleApiError {
    /// 401, or 403 outside the quota reasons. Never retried; a 401 gets one
    /// refresh-and-retry at the client boundary before surfacing.
    #[error("auth error (status {status})")]
    Auth { status: u16 },

    /// 403 with a quota-exhaustion reason
    #[error("quota exceeded: {reason}")]
    Quota { reason: String },

    /// 429
    #[error("rate limited")]
    RateLimited,

    /// 410; the sync engine consumes this by restarting as a full sync
    #[error("sync token expired")]
    SyncTokenExpired,

    /// 5xx
    #[error("google server error (status {status})")]
    Server { status: u16 },

    /// Transport-level failure (timeout, connect, read)
    #[error("network error: {message}")]
    Network { message: String, timeout: bool },

    /// Any other 4xx, with the Google error reason when the body carried one
    #[error("request failed (status {status})")]
    BadRequest { status: u16, reason: Option<String> },
}

impl GoogleApiError {
    /// Google's error reason for 4xx responses, when one was present.
    pub fn reason(&self) -> Option<&str> {
        match self {
            GoogleApiError::Quota { reason } => Some(reason),
            GoogleApiError::BadRequest { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }
}

impl GoogleApiError {
    /// Whether the retry controller may re-attempt the call.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            GoogleApiError::Quota { .. }
                | GoogleApiError::RateLimited
                | GoogleApiError::Server { .. }
                | GoogleApiError::Network { .. }
        )
    }

    /// HTTP-ish status code carried into `sync_error` records.
    pub fn status_code(&self) -> u16 {
        match self {
            GoogleApiError::Auth { status } => *status,
            GoogleApiError::Quota { .. } => 403,
            GoogleApiError::RateLimited => 429,
            GoogleApiError::SyncTokenExpired => 410,
            GoogleApiError::Server { status } => *status,
            GoogleApiError::Network { timeout, .. } => {
                if *timeout {
                    504
                } else {
                    503
                }
            }
            GoogleApiError::BadRequest { status, .. } => *status,
        }
    }
}

impl From<reqwest::Error> for GoogleApiError {
    fn from(err: reqwest::Error) -> Self {
        GoogleApiError::Network {
            message: err.to_string(),
            timeout: err.is_timeout(),
        }
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Suggested retry delay in seconds (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<C: Into<String>, M: Into<String>>(status: StatusCode, code: C, message: M) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            retry_after: None,
        }
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    pub fn bad_request(message: &str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message)
    }

    pub fn unauthorized(message: &str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal(message: &str) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            message,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

/// Maps an upstream Google failure surfaced by a request handler to the
/// outward 502/auth shape. Stream handlers never use this; they emit
/// `sync_error` records instead.
pub fn google_upstream_error(context: &str, err: &GoogleApiError) -> ApiError {
    match err {
        GoogleApiError::Auth { .. } => ApiError::new(
            StatusCode::UNAUTHORIZED,
            "GOOGLE_AUTH",
            format!("{context}: Google authorization failed"),
        ),
        _ => ApiError::new(
            StatusCode::BAD_GATEWAY,
            "PROVIDER_ERROR",
            format!("{context}: Google returned status {}", err.status_code()),
        ),
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(err: sea_orm::DbErr) -> Self {
        ApiError::internal(&err.to_string())
    }
}

impl From<crate::repositories::StoreError> for ApiError {
    fn from(err: crate::repositories::StoreError) -> Self {
        use crate::repositories::StoreError;
        match err {
            StoreError::NotFound { .. } => ApiError::not_found(&err.to_string()),
            _ => ApiError::internal(&err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(&err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(
            GoogleApiError::Quota {
                reason: "rateLimitExceeded".into()
            }
            .retryable()
        );
        assert!(GoogleApiError::RateLimited.retryable());
        assert!(GoogleApiError::Server { status: 503 }.retryable());
        assert!(
            GoogleApiError::Network {
                message: "timed out".into(),
                timeout: true
            }
            .retryable()
        );

        assert!(!GoogleApiError::Auth { status: 401 }.retryable());
        assert!(!GoogleApiError::Auth { status: 403 }.retryable());
        assert!(!GoogleApiError::SyncTokenExpired.retryable());
        assert!(
            !GoogleApiError::BadRequest {
                status: 404,
                reason: None
            }
            .retryable()
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(GoogleApiError::SyncTokenExpired.status_code(), 410);
        assert_eq!(GoogleApiError::RateLimited.status_code(), 429);
        assert_eq!(
            GoogleApiError::Network {
                message: "t".into(),
                timeout: true
            }
            .status_code(),
            504
        );
        assert_eq!(
            GoogleApiError::Network {
                message: "conn".into(),
                timeout: false
            }
            .status_code(),
            503
        );
    }

    #[test]
    fn test_api_error_response_shape() {
        let error = ApiError::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Rate limit exceeded",
        )
        .with_retry_after(5);

        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
        assert_eq!(response.headers().get("retry-after").unwrap(), "5");
    }
}
