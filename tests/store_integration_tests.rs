//! Store gateway integration tests against in-memory SQLite.

mod test_utils;

use std::sync::Arc;

use chrono::{Duration, Utc};
use chronos_sync::gcal::RawEvent;
use chronos_sync::repositories::{Store, StoreError, SyncStateUpdate, WebhookRegistration};
use chronos_sync::sync::transform::{encrypt_events, transform_events};
use test_utils::{insert_account, insert_calendar, setup_test_db, test_crypto};
use uuid::Uuid;

fn raw_event(id: &str, summary: &str) -> RawEvent {
    serde_json::from_value(serde_json::json!({
        "id": id,
        "summary": summary,
        "start": {"dateTime": "2025-06-15T10:00:00Z"},
        "end": {"dateTime": "2025-06-15T11:00:00Z"},
        "status": "confirmed"
    }))
    .expect("valid raw event")
}

async fn store_with_fixture() -> (Store, sea_orm::DatabaseConnection, Uuid, Uuid, Uuid) {
    let db = setup_test_db().await.unwrap();
    let crypto = Arc::new(test_crypto());
    let store = Store::new(db.clone(), crypto.clone());

    let user_id = Uuid::new_v4();
    let account_id = Uuid::new_v4();
    let calendar_id = Uuid::new_v4();
    insert_account(
        &db,
        &crypto,
        user_id,
        account_id,
        "access-token",
        Some("refresh-token"),
        Utc::now() + Duration::hours(1),
    )
    .await
    .unwrap();
    insert_calendar(&db, account_id, calendar_id, "cal-1", Some("#4285f4"))
        .await
        .unwrap();

    (store, db, user_id, account_id, calendar_id)
}

#[tokio::test]
async fn test_upsert_events_idempotent_by_natural_key() {
    let (store, _db, user_id, _account, calendar_id) = store_with_fixture().await;
    let crypto = test_crypto();

    let transformed = transform_events(
        vec![raw_event("e1", "Standup"), raw_event("e2", "Planning")],
        calendar_id,
        None,
    );
    let rows = encrypt_events(&transformed, &crypto, user_id).unwrap();
    assert_eq!(store.events.upsert_events(rows).await.unwrap(), 2);

    // Same natural keys again with one changed summary: still two rows.
    let updated = transform_events(
        vec![raw_event("e1", "Standup (moved)"), raw_event("e2", "Planning")],
        calendar_id,
        None,
    );
    let rows = encrypt_events(&updated, &crypto, user_id).unwrap();
    assert_eq!(store.events.upsert_events(rows).await.unwrap(), 2);

    let (single, masters, exceptions) = store.events.query_events(&[calendar_id]).await.unwrap();
    assert_eq!(single.len(), 2);
    assert!(masters.is_empty());
    assert!(exceptions.is_empty());

    let e1 = single
        .iter()
        .find(|row| row.google_event_id == "e1")
        .unwrap();
    assert_eq!(crypto.decrypt(&e1.summary, user_id).unwrap(), "Standup (moved)");
}

#[tokio::test]
async fn test_query_events_three_way_split() {
    let (store, _db, user_id, _account, calendar_id) = store_with_fixture().await;
    let crypto = test_crypto();

    let plain = raw_event("plain", "Plain");
    let cancelled: RawEvent = serde_json::from_value(serde_json::json!({
        "id": "gone", "summary": "Gone", "status": "cancelled",
        "start": {"dateTime": "2025-06-15T10:00:00Z"}
    }))
    .unwrap();
    let master: RawEvent = serde_json::from_value(serde_json::json!({
        "id": "master", "summary": "Weekly",
        "start": {"dateTime": "2025-06-15T10:00:00Z"},
        "recurrence": ["RRULE:FREQ=WEEKLY"]
    }))
    .unwrap();
    let exception: RawEvent = serde_json::from_value(serde_json::json!({
        "id": "master_20250622", "summary": "Weekly (moved)",
        "start": {"dateTime": "2025-06-22T12:00:00Z"},
        "recurringEventId": "master"
    }))
    .unwrap();

    let transformed = transform_events(
        vec![plain, cancelled, master, exception],
        calendar_id,
        None,
    );
    let rows = encrypt_events(&transformed, &crypto, user_id).unwrap();
    store.events.upsert_events(rows).await.unwrap();

    let (single, masters, exceptions) = store.events.query_events(&[calendar_id]).await.unwrap();

    assert_eq!(single.len(), 1);
    assert_eq!(single[0].google_event_id, "plain");
    assert_eq!(masters.len(), 1);
    assert_eq!(masters[0].google_event_id, "master");
    assert_eq!(exceptions.len(), 1);
    assert_eq!(exceptions[0].google_event_id, "master_20250622");
}

#[tokio::test]
async fn test_get_user_calendar_ids_intersection() {
    let (store, db, user_id, account_id, calendar_id) = store_with_fixture().await;

    let other_calendar = Uuid::new_v4();
    insert_calendar(&db, account_id, other_calendar, "cal-2", None)
        .await
        .unwrap();

    let all = store
        .calendars
        .get_user_calendar_ids(user_id, None)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);

    let subset = store
        .calendars
        .get_user_calendar_ids(user_id, Some(&[calendar_id, Uuid::new_v4()]))
        .await
        .unwrap();
    assert_eq!(subset, vec![calendar_id]);

    let other_user = store
        .calendars
        .get_user_calendar_ids(Uuid::new_v4(), None)
        .await
        .unwrap();
    assert!(other_user.is_empty());
}

#[tokio::test]
async fn test_sync_state_update_and_clear() {
    let (store, _db, _user, _account, calendar_id) = store_with_fixture().await;

    assert!(
        store
            .sync_state
            .get_calendar_sync_state(calendar_id)
            .await
            .unwrap()
            .is_none()
    );

    // Mid-full-sync progress save: empty token plus a page cursor.
    store
        .sync_state
        .update_calendar_sync_state(
            calendar_id,
            "",
            SyncStateUpdate {
                page_token: Some("pg2".to_string()),
                pages_fetched: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let state = store
        .sync_state
        .get_calendar_sync_state(calendar_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.sync_token.as_deref(), Some(""));
    assert_eq!(state.next_page_token.as_deref(), Some("pg2"));
    assert_eq!(state.pages_fetched, Some(1));
    assert!(!state.full_sync_complete);

    // Commit: token set, page cursor cleared.
    store
        .sync_state
        .update_calendar_sync_state(
            calendar_id,
            "tok-1",
            SyncStateUpdate {
                page_token: None,
                items_upserted: Some(3),
                sync_duration_ms: Some(125),
                full_sync_complete: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let state = store
        .sync_state
        .get_calendar_sync_state(calendar_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.sync_token.as_deref(), Some("tok-1"));
    assert!(state.next_page_token.is_none());
    assert!(state.full_sync_complete);
    assert_eq!(state.items_upserted, Some(3));

    store
        .sync_state
        .clear_calendar_sync_state(calendar_id)
        .await
        .unwrap();
    let state = store
        .sync_state
        .get_calendar_sync_state(calendar_id)
        .await
        .unwrap()
        .unwrap();
    assert!(state.sync_token.is_none());
    assert!(state.next_page_token.is_none());
}

#[tokio::test]
async fn test_webhook_registration_and_channel_lookup() {
    let (store, _db, user_id, _account, calendar_id) = store_with_fixture().await;

    store
        .sync_state
        .save_webhook_registration(
            calendar_id,
            WebhookRegistration {
                channel_id: "chan-1".to_string(),
                resource_id: "res-1".to_string(),
                channel_token: "secret-token".to_string(),
                expires_at: Utc::now() + Duration::days(7),
            },
        )
        .await
        .unwrap();

    let route = store
        .sync_state
        .get_sync_state_by_channel_id("chan-1")
        .await
        .unwrap()
        .expect("route resolves");
    assert_eq!(route.calendar_id, calendar_id);
    assert_eq!(route.user_id, user_id);
    assert_eq!(route.channel_token.as_deref(), Some("secret-token"));

    assert!(
        store
            .sync_state
            .get_sync_state_by_channel_id("unknown-chan")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_get_decrypted_tokens_scoped_to_user() {
    let (store, _db, user_id, account_id, _calendar) = store_with_fixture().await;

    let tokens = store
        .accounts
        .get_decrypted_tokens(user_id, account_id)
        .await
        .unwrap();
    assert_eq!(tokens.access_token, "access-token");
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-token"));

    let result = store
        .accounts
        .get_decrypted_tokens(Uuid::new_v4(), account_id)
        .await;
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

#[tokio::test]
async fn test_mark_needs_reauth() {
    let (store, db, _user, account_id, _calendar) = store_with_fixture().await;

    store.accounts.mark_needs_reauth(account_id).await.unwrap();
    assert!(test_utils::account_needs_reauth(&db, account_id).await);
}
