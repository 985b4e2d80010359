//! Thin transport layer over the Google Calendar v3 REST API.
//!
//! Maps HTTP responses into the error taxonomy, runs every call inside the
//! account limiter, and handles the 401 refresh-and-retry-once contract: a
//! first 401 forces a token refresh and a single replay; a second 401 marks
//! the account needs-reauth and surfaces as an auth error.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::instrument;
use uuid::Uuid;

use crate::error::GoogleApiError;
use crate::repositories::{CalendarUpsert, Store};

use super::limits::AccountLimiter;
use super::token::TokenManager;
use super::{EVENTS_PAGE_SIZE, QUOTA_ERROR_REASONS, store_error_to_google};

/// Google's `{date|dateTime, timeZone}` object for event boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventDateTime {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.date_time.is_none()
    }
}

/// One event as returned by the events endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    pub id: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<EventDateTime>,
    pub end: Option<EventDateTime>,
    pub original_start_time: Option<EventDateTime>,
    pub recurrence: Option<Vec<String>>,
    pub recurring_event_id: Option<String>,
    pub status: Option<String>,
    pub visibility: Option<String>,
    pub transparency: Option<String>,
    pub attendees: Option<JsonValue>,
    pub organizer: Option<JsonValue>,
    pub color_id: Option<String>,
    pub reminders: Option<JsonValue>,
    pub conference_data: Option<JsonValue>,
    pub html_link: Option<String>,
    #[serde(rename = "iCalUID")]
    pub ical_uid: Option<String>,
    pub etag: Option<String>,
    pub created: Option<String>,
    pub updated: Option<String>,
}

/// One page of the events listing. `next_sync_token` is present only on the
/// final page.
#[derive(Debug, Clone)]
pub struct EventsPage {
    pub items: Vec<RawEvent>,
    pub next_page_token: Option<String>,
    pub next_sync_token: Option<String>,
}

/// Cursor for the next events request: exactly one of a page token or a
/// sync token, or neither for an initial full sync.
#[derive(Debug, Clone)]
pub enum PageRequest {
    Full,
    Resume(String),
    Incremental(String),
}

/// Local view of a calendar joined with its account metadata, returned by
/// the calendar-list refresh.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CalendarView {
    pub id: Uuid,
    pub google_calendar_id: String,
    pub name: String,
    pub color: Option<String>,
    pub is_primary: bool,
    pub google_account_id: Uuid,
    pub account_email: String,
    pub account_name: String,
    pub needs_reauth: bool,
}

/// Established watch channel.
#[derive(Debug, Clone)]
pub struct WatchChannel {
    pub resource_id: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventsResponse {
    #[serde(default)]
    items: Vec<RawEvent>,
    next_page_token: Option<String>,
    next_sync_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListResponse {
    #[serde(default)]
    items: Vec<CalendarListEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalendarListEntry {
    id: String,
    summary: Option<String>,
    background_color: Option<String>,
    #[serde(default)]
    primary: bool,
    access_role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchResponse {
    resource_id: String,
    expiration: Option<JsonValue>,
}

pub struct GoogleClient {
    http: reqwest::Client,
    store: Store,
    tokens: Arc<TokenManager>,
    limiter: Arc<AccountLimiter>,
    api_base_url: String,
}

impl GoogleClient {
    pub fn new(
        http: reqwest::Client,
        store: Store,
        tokens: Arc<TokenManager>,
        limiter: Arc<AccountLimiter>,
        api_base_url: String,
    ) -> Self {
        Self {
            http,
            store,
            tokens,
            limiter,
            api_base_url,
        }
    }

    /// Fetches the remote calendar list, upserts it into the local store,
    /// and returns the stored rows with account metadata attached.
    #[instrument(skip(self), fields(google_account_id = %google_account_id))]
    pub async fn list_calendars(
        &self,
        user_id: Uuid,
        google_account_id: Uuid,
    ) -> Result<Vec<CalendarView>, GoogleApiError> {
        let url = format!("{}/users/me/calendarList", self.api_base_url);
        let response: CalendarListResponse = self
            .authorized_get(user_id, google_account_id, &url, Vec::new())
            .await?;

        let account = self
            .store
            .accounts
            .get_google_account(google_account_id)
            .await
            .map_err(store_error_to_google)?
            .ok_or(GoogleApiError::Auth { status: 401 })?;

        let entries = response
            .items
            .into_iter()
            .map(|cal| CalendarUpsert {
                google_calendar_id: cal.id,
                name: cal.summary.unwrap_or_default(),
                color: cal.background_color,
                is_primary: cal.primary,
                access_role: cal.access_role.unwrap_or_else(|| "reader".to_string()),
            })
            .collect();

        let rows = self
            .store
            .calendars
            .upsert_calendars(google_account_id, entries)
            .await
            .map_err(store_error_to_google)?;

        Ok(rows
            .into_iter()
            .map(|row| CalendarView {
                id: row.id,
                google_calendar_id: row.google_calendar_id,
                name: row.name,
                color: row.color,
                is_primary: row.is_primary,
                google_account_id,
                account_email: account.email.clone(),
                account_name: account.name.clone().unwrap_or_default(),
                needs_reauth: account.needs_reauth,
            })
            .collect())
    }

    /// Fetches one page of events. The external calendar id is
    /// percent-encoded; the cursor supplies `pageToken` XOR `syncToken`.
    pub async fn fetch_events_page(
        &self,
        user_id: Uuid,
        google_account_id: Uuid,
        external_calendar_id: &str,
        cursor: &PageRequest,
    ) -> Result<EventsPage, GoogleApiError> {
        let url = format!(
            "{}/calendars/{}/events",
            self.api_base_url,
            urlencoding::encode(external_calendar_id)
        );

        let mut query = vec![
            ("singleEvents".to_string(), "false".to_string()),
            ("showDeleted".to_string(), "true".to_string()),
            ("maxResults".to_string(), EVENTS_PAGE_SIZE.to_string()),
        ];
        match cursor {
            PageRequest::Full => {}
            PageRequest::Resume(page_token) => {
                query.push(("pageToken".to_string(), page_token.clone()));
            }
            PageRequest::Incremental(sync_token) => {
                query.push(("syncToken".to_string(), sync_token.clone()));
            }
        }

        let response: EventsResponse = self
            .authorized_get(user_id, google_account_id, &url, query)
            .await?;

        Ok(EventsPage {
            items: response.items,
            next_page_token: response.next_page_token,
            next_sync_token: response.next_sync_token,
        })
    }

    /// Registers a push notification channel for a calendar.
    #[instrument(skip(self, channel_token), fields(google_account_id = %google_account_id))]
    pub async fn create_watch_channel(
        &self,
        user_id: Uuid,
        google_account_id: Uuid,
        external_calendar_id: &str,
        webhook_url: &str,
        channel_id: &str,
        channel_token: &str,
    ) -> Result<WatchChannel, GoogleApiError> {
        let url = format!(
            "{}/calendars/{}/events/watch",
            self.api_base_url,
            urlencoding::encode(external_calendar_id)
        );
        let body = serde_json::json!({
            "id": channel_id,
            "token": channel_token,
            "type": "web_hook",
            "address": webhook_url,
        });

        let response: WatchResponse = self
            .limiter
            .with_retry(google_account_id, || {
                self.send_authorized(user_id, google_account_id, |token| {
                    self.http.post(&url).json(&body).bearer_auth(token)
                })
            })
            .await?;

        Ok(WatchChannel {
            resource_id: response.resource_id,
            expires_at: parse_expiration_ms(response.expiration.as_ref()),
        })
    }

    async fn authorized_get<T: serde::de::DeserializeOwned>(
        &self,
        user_id: Uuid,
        google_account_id: Uuid,
        url: &str,
        query: Vec<(String, String)>,
    ) -> Result<T, GoogleApiError> {
        self.limiter
            .with_retry(google_account_id, || {
                self.send_authorized(user_id, google_account_id, |token| {
                    self.http.get(url).query(&query).bearer_auth(token)
                })
            })
            .await
    }

    /// Sends one authorized request, applying the 401
    /// refresh-and-retry-once contract. Orthogonal to the retry loop: the
    /// limiter never replays auth errors.
    async fn send_authorized<T, B>(
        &self,
        user_id: Uuid,
        google_account_id: Uuid,
        build: B,
    ) -> Result<T, GoogleApiError>
    where
        T: serde::de::DeserializeOwned,
        B: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self
            .tokens
            .get_valid_access_token(user_id, google_account_id)
            .await?;

        let response = build(&token).send().await?;
        match handle_response::<T>(response).await {
            Err(GoogleApiError::Auth { status: 401 }) => {
                let fresh = self
                    .tokens
                    .refresh_after_auth_failure(user_id, google_account_id, &token)
                    .await?;

                let response = build(&fresh).send().await?;
                match handle_response::<T>(response).await {
                    Err(GoogleApiError::Auth { status: 401 }) => {
                        self.store
                            .accounts
                            .mark_needs_reauth(google_account_id)
                            .await
                            .map_err(store_error_to_google)?;
                        Err(GoogleApiError::Auth { status: 401 })
                    }
                    other => other,
                }
            }
            other => other,
        }
    }
}

async fn handle_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GoogleApiError> {
    let status = response.status();
    if status.is_success() {
        return response.json::<T>().await.map_err(GoogleApiError::from);
    }

    let code = status.as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(classify_error_status(code, &body))
}

/// Maps a non-2xx status (plus body, for the 403 reason) into the taxonomy.
pub fn classify_error_status(status: u16, body: &str) -> GoogleApiError {
    match status {
        401 => GoogleApiError::Auth { status: 401 },
        403 => {
            let reason = extract_error_reason(body);
            if QUOTA_ERROR_REASONS.contains(&reason.as_str()) {
                GoogleApiError::Quota { reason }
            } else {
                GoogleApiError::Auth { status: 403 }
            }
        }
        429 => GoogleApiError::RateLimited,
        410 => GoogleApiError::SyncTokenExpired,
        s if s >= 500 => GoogleApiError::Server { status: s },
        s => GoogleApiError::BadRequest {
            status: s,
            reason: {
                let reason = extract_error_reason(body);
                (!reason.is_empty()).then_some(reason)
            },
        },
    }
}

/// First `error.errors[0].reason` of a Google error body, or "".
fn extract_error_reason(body: &str) -> String {
    serde_json::from_str::<JsonValue>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("errors")?
                .get(0)?
                .get("reason")?
                .as_str()
                .map(str::to_string)
        })
        .unwrap_or_default()
}

/// Google reports watch expiration as epoch milliseconds, sometimes as a
/// JSON string. Unparseable values fall back to "already expired" so the
/// next sync re-registers.
fn parse_expiration_ms(expiration: Option<&JsonValue>) -> DateTime<Utc> {
    let millis = match expiration {
        Some(JsonValue::String(s)) => s.parse::<i64>().ok(),
        Some(JsonValue::Number(n)) => n.as_i64(),
        _ => None,
    };
    millis
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_quota_vs_forbidden() {
        let quota_body = r#"{"error":{"errors":[{"reason":"rateLimitExceeded"}]}}"#;
        assert!(matches!(
            classify_error_status(403, quota_body),
            GoogleApiError::Quota { .. }
        ));

        let forbidden_body = r#"{"error":{"errors":[{"reason":"forbidden"}]}}"#;
        assert!(matches!(
            classify_error_status(403, forbidden_body),
            GoogleApiError::Auth { status: 403 }
        ));

        assert!(matches!(
            classify_error_status(403, "not json"),
            GoogleApiError::Auth { status: 403 }
        ));
    }

    #[test]
    fn test_classify_status_table() {
        assert!(matches!(
            classify_error_status(401, ""),
            GoogleApiError::Auth { status: 401 }
        ));
        assert!(matches!(
            classify_error_status(429, ""),
            GoogleApiError::RateLimited
        ));
        assert!(matches!(
            classify_error_status(410, ""),
            GoogleApiError::SyncTokenExpired
        ));
        assert!(matches!(
            classify_error_status(500, ""),
            GoogleApiError::Server { status: 500 }
        ));
        assert!(matches!(
            classify_error_status(503, ""),
            GoogleApiError::Server { status: 503 }
        ));
        assert!(matches!(
            classify_error_status(404, ""),
            GoogleApiError::BadRequest { status: 404, .. }
        ));
    }

    #[test]
    fn test_classify_carries_bad_request_reason() {
        let body = r#"{"error":{"errors":[{"reason":"pushNotSupportedForRequestedResource"}]}}"#;
        match classify_error_status(400, body) {
            GoogleApiError::BadRequest { status, reason } => {
                assert_eq!(status, 400);
                assert_eq!(
                    reason.as_deref(),
                    Some("pushNotSupportedForRequestedResource")
                );
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn test_parse_expiration_ms() {
        let as_string = serde_json::json!("1735689600000");
        let parsed = parse_expiration_ms(Some(&as_string));
        assert_eq!(parsed.timestamp_millis(), 1_735_689_600_000);

        let as_number = serde_json::json!(1_735_689_600_000_i64);
        let parsed = parse_expiration_ms(Some(&as_number));
        assert_eq!(parsed.timestamp_millis(), 1_735_689_600_000);
    }

    #[test]
    fn test_raw_event_deserializes_google_shape() {
        let raw: RawEvent = serde_json::from_str(
            r#"{
                "id": "e1",
                "summary": "Standup",
                "start": {"dateTime": "2025-06-15T10:00:00Z"},
                "end": {"dateTime": "2025-06-15T11:00:00Z"},
                "iCalUID": "e1@google.com",
                "recurringEventId": "master-1",
                "originalStartTime": {"date": "2025-06-15"},
                "status": "confirmed"
            }"#,
        )
        .unwrap();

        assert_eq!(raw.id, "e1");
        assert_eq!(raw.ical_uid.as_deref(), Some("e1@google.com"));
        assert_eq!(raw.recurring_event_id.as_deref(), Some("master-1"));
        assert_eq!(
            raw.original_start_time.unwrap().date.as_deref(),
            Some("2025-06-15")
        );
        assert_eq!(
            raw.start.unwrap().date_time.as_deref(),
            Some("2025-06-15T10:00:00Z")
        );
    }
}
