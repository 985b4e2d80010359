//! # API Handlers
//!
//! HTTP endpoint handlers for the calendar sync service.

pub mod calendar;
pub mod webhooks;

use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::health_check;
use crate::error::ApiError;
use crate::models::ServiceInfo;
use crate::server::AppState;

/// Root handler that returns basic service information
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    ),
    tag = "root"
)]
pub async fn root(State(_state): State<AppState>) -> Result<Json<ServiceInfo>, ApiError> {
    Ok(Json(ServiceInfo::default()))
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Service identifier
    pub service: String,
    /// Service version
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            service: "chronos-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Liveness/readiness probe backed by a database round trip.
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 500, description = "Database unreachable", body = ApiError)
    ),
    tag = "root"
)]
pub async fn healthz(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    health_check(&state.db)
        .await
        .map_err(|e| ApiError::internal(&e.to_string()))?;
    Ok(Json(HealthResponse::default()))
}
