//! # Authentication
//!
//! Request identity for the API surface. User login is handled by the host
//! application's identity layer, which attaches the authenticated user to
//! the request as a [`CurrentUser`] extension before the router runs;
//! handlers extract it and get a 401 when it is missing.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::error::ApiError;

/// The authenticated user for the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentUser(pub Uuid);

impl CurrentUser {
    pub fn id(&self) -> Uuid {
        self.0
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .copied()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}
