//! Process-wide sync services, constructed once at startup.
//!
//! The pooled HTTP client, per-account limiter, user rate-limit cache and
//! webhook debouncer all live on this value, owned by the application host
//! and passed to handlers through [`crate::server::AppState`]. Nothing in
//! the sync core is process-global.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::crypto::CryptoService;
use crate::gcal::{AccountLimiter, GoogleClient, TokenManager};
use crate::repositories::Store;
use crate::sync::{
    OrchestratorConfig, SyncEngine, SyncOrchestrator, WebhookDispatcher, WebhookSettings,
};

/// Connection pool and timeout settings for the shared HTTP client.
const HTTP_READ_TIMEOUT: Duration = Duration::from_secs(30);
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HTTP_MAX_IDLE_PER_HOST: usize = 50;

pub struct SyncRuntime {
    pub crypto: Arc<CryptoService>,
    pub store: Store,
    pub google: Arc<GoogleClient>,
    pub engine: Arc<SyncEngine>,
    pub orchestrator: Arc<SyncOrchestrator>,
    pub webhooks: Arc<WebhookDispatcher>,
}

impl SyncRuntime {
    pub fn new(config: &AppConfig, db: DatabaseConnection) -> Result<Self> {
        Self::with_orchestrator_config(config, db, OrchestratorConfig::default())
    }

    /// Full constructor; tests shrink the orchestrator durations.
    pub fn with_orchestrator_config(
        config: &AppConfig,
        db: DatabaseConnection,
        orchestrator_config: OrchestratorConfig,
    ) -> Result<Self> {
        let crypto = Arc::new(
            CryptoService::new(&config.encryption_master_key)
                .context("invalid encryption master key")?,
        );
        let store = Store::new(db, crypto.clone());

        let http = reqwest::Client::builder()
            .timeout(HTTP_READ_TIMEOUT)
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .pool_max_idle_per_host(HTTP_MAX_IDLE_PER_HOST)
            .build()
            .context("failed to build HTTP client")?;

        let limiter = Arc::new(AccountLimiter::new(config.retry.clone()));

        let tokens = Arc::new(TokenManager::new(
            http.clone(),
            store.clone(),
            limiter.clone(),
            config.google_oauth_token_url.clone(),
            config.google_client_id.clone(),
            config.google_client_secret.clone(),
        ));

        let google = Arc::new(GoogleClient::new(
            http,
            store.clone(),
            tokens,
            limiter,
            config.google_api_base_url.clone(),
        ));

        let engine = Arc::new(SyncEngine::new(
            store.clone(),
            google.clone(),
            crypto.clone(),
            WebhookSettings {
                base_url: config.webhook_base_url.clone(),
                channel_buffer_hours: config.webhook_channel_buffer_hours,
            },
        ));

        let orchestrator = Arc::new(SyncOrchestrator::new(
            engine.clone(),
            store.clone(),
            orchestrator_config,
        ));

        let webhooks = Arc::new(WebhookDispatcher::new(
            engine.clone(),
            store.clone(),
            Duration::from_millis(config.webhook_debounce_ms),
        ));

        Ok(Self {
            crypto,
            store,
            google,
            engine,
            orchestrator,
            webhooks,
        })
    }
}
