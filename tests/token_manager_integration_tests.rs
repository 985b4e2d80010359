//! Token manager integration tests: single-flight refresh and the
//! needs-reauth escalation paths.

mod test_utils;

use std::sync::Arc;

use chrono::{Duration, Utc};
use chronos_sync::config::RetryPolicyConfig;
use chronos_sync::error::GoogleApiError;
use chronos_sync::gcal::{AccountLimiter, TokenManager};
use chronos_sync::repositories::Store;
use test_utils::{account_needs_reauth, insert_account, setup_test_db, test_crypto};
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn token_manager_with_account(
    oauth_url: String,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in_minutes: i64,
) -> (TokenManager, sea_orm::DatabaseConnection, Uuid, Uuid) {
    let db = setup_test_db().await.unwrap();
    let crypto = Arc::new(test_crypto());
    let store = Store::new(db.clone(), crypto.clone());

    let user_id = Uuid::new_v4();
    let account_id = Uuid::new_v4();
    insert_account(
        &db,
        &crypto,
        user_id,
        account_id,
        access_token,
        refresh_token,
        Utc::now() + Duration::minutes(expires_in_minutes),
    )
    .await
    .unwrap();

    let limiter = Arc::new(AccountLimiter::new(RetryPolicyConfig {
        max_attempts: 5,
        base_delay_ms: 5,
    }));
    let manager = TokenManager::new(
        reqwest::Client::new(),
        store,
        limiter,
        oauth_url,
        "test-client-id".to_string(),
        "test-client-secret".to_string(),
    );

    (manager, db, user_id, account_id)
}

#[tokio::test]
async fn test_fresh_token_returned_without_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (manager, _db, user_id, account_id) = token_manager_with_account(
        format!("{}/token", server.uri()),
        "still-valid",
        Some("rt"),
        60,
    )
    .await;

    let token = manager
        .get_valid_access_token(user_id, account_id)
        .await
        .unwrap();
    assert_eq!(token, "still-valid");
}

#[tokio::test]
async fn test_concurrent_callers_trigger_exactly_one_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-rt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "refreshed-at",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    // Expired token: every caller sees a refresh as necessary.
    let (manager, db, user_id, account_id) = token_manager_with_account(
        format!("{}/token", server.uri()),
        "expired-at",
        Some("old-rt"),
        -5,
    )
    .await;
    let manager = Arc::new(manager);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let manager = manager.clone();
        handles.push(tokio::spawn(async move {
            manager.get_valid_access_token(user_id, account_id).await
        }));
    }

    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token, "refreshed-at");
    }

    // The persisted token decrypts to the refreshed value.
    let store = Store::new(db.clone(), Arc::new(test_crypto()));
    let tokens = store
        .accounts
        .get_decrypted_tokens(user_id, account_id)
        .await
        .unwrap();
    assert_eq!(tokens.access_token, "refreshed-at");
    assert!(tokens.expires_at > Utc::now() + Duration::minutes(30));
}

#[tokio::test]
async fn test_rotated_refresh_token_is_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "new-at",
            "expires_in": 3600,
            "refresh_token": "rotated-rt"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, db, user_id, account_id) =
        token_manager_with_account(format!("{}/token", server.uri()), "old-at", Some("old-rt"), -5)
            .await;

    let token = manager
        .get_valid_access_token(user_id, account_id)
        .await
        .unwrap();
    assert_eq!(token, "new-at");

    let store = Store::new(db.clone(), Arc::new(test_crypto()));
    let tokens = store
        .accounts
        .get_decrypted_tokens(user_id, account_id)
        .await
        .unwrap();
    assert_eq!(tokens.refresh_token.as_deref(), Some("rotated-rt"));
}

#[tokio::test]
async fn test_refresh_rejection_marks_needs_reauth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (manager, db, user_id, account_id) =
        token_manager_with_account(format!("{}/token", server.uri()), "old-at", Some("dead-rt"), -5)
            .await;

    let result = manager.get_valid_access_token(user_id, account_id).await;
    assert!(matches!(result, Err(GoogleApiError::Auth { status: 401 })));
    assert!(account_needs_reauth(&db, account_id).await);
}

#[tokio::test]
async fn test_missing_refresh_token_marks_needs_reauth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (manager, db, user_id, account_id) =
        token_manager_with_account(format!("{}/token", server.uri()), "old-at", None, -5).await;

    let result = manager.get_valid_access_token(user_id, account_id).await;
    assert!(matches!(result, Err(GoogleApiError::Auth { status: 401 })));
    assert!(account_needs_reauth(&db, account_id).await);
}
