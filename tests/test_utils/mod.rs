//! Test utilities for integration tests.
//!
//! Sets up in-memory SQLite databases with migrations applied, inserts
//! account/calendar fixtures with encrypted tokens, and builds a sync
//! runtime pointed at a wiremock server.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use chronos_sync::config::{AppConfig, RetryPolicyConfig};
use chronos_sync::crypto::CryptoService;
use chronos_sync::models::{calendar_sync_state, google_account, google_account_token, google_calendar};
use chronos_sync::runtime::SyncRuntime;
use chronos_sync::sync::OrchestratorConfig;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Set, Statement};
use uuid::Uuid;

pub const TEST_MASTER_SECRET: &str = "a-test-master-secret-of-decent-length";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;

    // SQLite does not enforce our Postgres foreign key semantics; disable FK
    // checks so fixtures can be inserted without full relation chains.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

pub fn test_crypto() -> CryptoService {
    CryptoService::new(TEST_MASTER_SECRET).expect("valid test secret")
}

/// Config pointed at a wiremock server, with fast retries for test speed.
pub fn test_config(google_base_url: &str, oauth_token_url: &str) -> AppConfig {
    AppConfig {
        encryption_master_key: TEST_MASTER_SECRET.to_string(),
        google_client_id: "test-client-id".to_string(),
        google_client_secret: "test-client-secret".to_string(),
        google_api_base_url: google_base_url.trim_end_matches('/').to_string(),
        google_oauth_token_url: oauth_token_url.to_string(),
        webhook_base_url: None,
        webhook_debounce_ms: 25,
        retry: RetryPolicyConfig {
            max_attempts: 5,
            base_delay_ms: 5,
        },
        ..Default::default()
    }
}

pub fn test_runtime(config: &AppConfig, db: &DatabaseConnection) -> Arc<SyncRuntime> {
    Arc::new(SyncRuntime::new(config, db.clone()).expect("runtime builds"))
}

pub fn test_runtime_with_orchestrator(
    config: &AppConfig,
    db: &DatabaseConnection,
    orchestrator: OrchestratorConfig,
) -> Arc<SyncRuntime> {
    Arc::new(
        SyncRuntime::with_orchestrator_config(config, db.clone(), orchestrator)
            .expect("runtime builds"),
    )
}

/// Orchestrator settings shrunk for tests; durations stay long enough that
/// they never fire unless a test wants them to.
pub fn fast_orchestrator_config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_sync_duration: Duration::from_secs(30),
        keep_alive_interval: Duration::from_secs(10),
        ..Default::default()
    }
}

/// Inserts a Google account with encrypted tokens.
pub async fn insert_account(
    db: &DatabaseConnection,
    crypto: &CryptoService,
    user_id: Uuid,
    google_account_id: Uuid,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let now = Utc::now();

    google_account::ActiveModel {
        id: Set(google_account_id),
        user_id: Set(user_id),
        google_id: Set(format!("google-{google_account_id}")),
        email: Set("fixture@example.com".to_string()),
        name: Set(Some("Fixture Account".to_string())),
        needs_reauth: Set(false),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(db)
    .await?;

    let access_ct = crypto.encrypt(access_token, user_id)?;
    let refresh_ct = refresh_token
        .map(|t| crypto.encrypt(t, user_id))
        .transpose()?;

    google_account_token::ActiveModel {
        google_account_id: Set(google_account_id),
        access_token: Set(access_ct),
        refresh_token: Set(refresh_ct),
        expires_at: Set(expires_at.into()),
        updated_at: Set(now.into()),
    }
    .insert(db)
    .await?;

    Ok(())
}

/// Inserts a calendar for an account.
pub async fn insert_calendar(
    db: &DatabaseConnection,
    google_account_id: Uuid,
    calendar_id: Uuid,
    external_id: &str,
    color: Option<&str>,
) -> Result<()> {
    let now = Utc::now();

    google_calendar::ActiveModel {
        id: Set(calendar_id),
        google_account_id: Set(google_account_id),
        google_calendar_id: Set(external_id.to_string()),
        name: Set(format!("Calendar {external_id}")),
        color: Set(color.map(str::to_string)),
        is_primary: Set(false),
        access_role: Set("owner".to_string()),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(db)
    .await?;

    Ok(())
}

/// Reads the sync state row for a calendar.
pub async fn get_sync_state(
    db: &DatabaseConnection,
    calendar_id: Uuid,
) -> Option<calendar_sync_state::Model> {
    calendar_sync_state::Entity::find_by_id(calendar_id)
        .one(db)
        .await
        .expect("sync state query")
}

/// Reads the needs_reauth flag for an account.
pub async fn account_needs_reauth(db: &DatabaseConnection, google_account_id: Uuid) -> bool {
    google_account::Entity::find_by_id(google_account_id)
        .one(db)
        .await
        .expect("account query")
        .expect("account exists")
        .needs_reauth
}
