//! OAuth token lifecycle for linked Google accounts.
//!
//! Returns a valid access token for an account, refreshing through Google's
//! token endpoint when the stored token is near expiry. Refreshes are
//! single-flight per account: concurrent callers spanning an expiring
//! window produce exactly one network call, via a double-checked read under
//! the per-account refresh lock.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::error::GoogleApiError;
use crate::repositories::{DecryptedTokens, Store};

use super::limits::AccountLimiter;
use super::{TOKEN_REFRESH_BUFFER_SECS, store_error_to_google};

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

pub struct TokenManager {
    http: reqwest::Client,
    store: Store,
    limiter: Arc<AccountLimiter>,
    oauth_token_url: String,
    client_id: String,
    client_secret: String,
}

impl TokenManager {
    pub fn new(
        http: reqwest::Client,
        store: Store,
        limiter: Arc<AccountLimiter>,
        oauth_token_url: String,
        client_id: String,
        client_secret: String,
    ) -> Self {
        Self {
            http,
            store,
            limiter,
            oauth_token_url,
            client_id,
            client_secret,
        }
    }

    /// Returns a valid access token, refreshing if it expires within the
    /// buffer window.
    #[instrument(skip(self), fields(google_account_id = %google_account_id))]
    pub async fn get_valid_access_token(
        &self,
        user_id: Uuid,
        google_account_id: Uuid,
    ) -> Result<String, GoogleApiError> {
        let tokens = self
            .store
            .accounts
            .get_decrypted_tokens(user_id, google_account_id)
            .await
            .map_err(store_error_to_google)?;

        if !token_needs_refresh(tokens.expires_at) {
            return Ok(tokens.access_token);
        }

        let lock = self.limiter.refresh_lock(google_account_id);
        let _guard = lock.lock().await;

        // Re-read inside the critical section: another caller may have
        // completed the refresh while we waited on the lock.
        let tokens = self
            .store
            .accounts
            .get_decrypted_tokens(user_id, google_account_id)
            .await
            .map_err(store_error_to_google)?;

        if !token_needs_refresh(tokens.expires_at) {
            return Ok(tokens.access_token);
        }

        self.refresh_locked(user_id, google_account_id, &tokens)
            .await
    }

    /// Forced refresh after a request-level 401. Single-flight with the
    /// regular path: if another caller already replaced the failing token we
    /// return the replacement without a network call.
    pub async fn refresh_after_auth_failure(
        &self,
        user_id: Uuid,
        google_account_id: Uuid,
        failed_access_token: &str,
    ) -> Result<String, GoogleApiError> {
        let lock = self.limiter.refresh_lock(google_account_id);
        let _guard = lock.lock().await;

        let tokens = self
            .store
            .accounts
            .get_decrypted_tokens(user_id, google_account_id)
            .await
            .map_err(store_error_to_google)?;

        if tokens.access_token != failed_access_token {
            return Ok(tokens.access_token);
        }

        self.refresh_locked(user_id, google_account_id, &tokens)
            .await
    }

    /// Performs the refresh grant. Caller must hold the refresh lock.
    async fn refresh_locked(
        &self,
        user_id: Uuid,
        google_account_id: Uuid,
        tokens: &DecryptedTokens,
    ) -> Result<String, GoogleApiError> {
        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            warn!(%google_account_id, "No refresh token on file");
            self.store
                .accounts
                .mark_needs_reauth(google_account_id)
                .await
                .map_err(store_error_to_google)?;
            return Err(GoogleApiError::Auth { status: 401 });
        };

        let started = std::time::Instant::now();
        let response = self
            .http
            .post(&self.oauth_token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            warn!(%google_account_id, status, "Token refresh rejected by Google");
            counter!("token_refresh_failure_total").increment(1);
            self.store
                .accounts
                .mark_needs_reauth(google_account_id)
                .await
                .map_err(store_error_to_google)?;
            return Err(GoogleApiError::Auth { status: 401 });
        }

        let refreshed: RefreshResponse = response.json().await?;
        let expires_at = Utc::now() + Duration::seconds(refreshed.expires_in.unwrap_or(3600));

        self.store
            .accounts
            .store_refreshed_tokens(
                user_id,
                google_account_id,
                &refreshed.access_token,
                expires_at,
                refreshed.refresh_token.as_deref(),
            )
            .await
            .map_err(store_error_to_google)?;

        histogram!("token_refresh_latency_ms")
            .record(started.elapsed().as_secs_f64() * 1_000.0);
        counter!("token_refresh_success_total").increment(1);
        info!(
            %google_account_id,
            rotated_refresh_token = refreshed.refresh_token.is_some(),
            "Refreshed Google access token"
        );

        Ok(refreshed.access_token)
    }
}

/// A token expiring within the buffer window counts as expired.
pub fn token_needs_refresh(expires_at: DateTime<Utc>) -> bool {
    expires_at < Utc::now() + Duration::seconds(TOKEN_REFRESH_BUFFER_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_needs_refresh_boundary() {
        assert!(token_needs_refresh(Utc::now()));
        assert!(token_needs_refresh(Utc::now() + Duration::minutes(4)));
        assert!(!token_needs_refresh(Utc::now() + Duration::minutes(6)));
        assert!(token_needs_refresh(Utc::now() - Duration::hours(1)));
    }
}
