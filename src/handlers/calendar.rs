//! Calendar endpoints: decrypted reads, calendar-list refresh, and the
//! streaming sync endpoint.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::Json,
    response::sse::{Event as SseEvent, Sse},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_stream::{Stream, StreamExt, wrappers::UnboundedReceiverStream};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{ApiError, google_upstream_error};
use crate::gcal::CalendarView;
use crate::server::AppState;
use crate::sync::transform::decrypt_stored_event;
use crate::sync::{ClientEvent, SyncRequestError};

/// Hard cap on calendars per request, mirrored by the orchestrator.
pub const MAX_CALENDARS_PER_SYNC: usize = 20;

#[derive(Debug, Deserialize)]
pub struct CalendarIdsQuery {
    pub calendar_ids: Option<String>,
}

/// Stored events split by recurrence role.
#[derive(Debug, Serialize, ToSchema)]
pub struct EventsResponse {
    pub events: Vec<ClientEvent>,
    pub masters: Vec<ClientEvent>,
    pub exceptions: Vec<ClientEvent>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccountInfo {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub needs_reauth: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AccountsResponse {
    pub accounts: Vec<AccountInfo>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CalendarInfo {
    pub id: Uuid,
    pub google_account_id: Uuid,
    pub google_calendar_id: String,
    pub name: String,
    pub color: Option<String>,
    pub is_primary: bool,
    pub access_role: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CalendarsResponse {
    pub calendars: Vec<CalendarInfo>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshCalendarsResponse {
    pub calendars: Vec<CalendarView>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Parses the comma-separated `calendar_ids` query parameter.
pub fn parse_calendar_ids(
    raw: Option<&str>,
    max: usize,
) -> Result<Option<Vec<Uuid>>, ApiError> {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Ok(None);
    };

    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() > max {
        return Err(ApiError::bad_request(&format!(
            "Too many calendars. Maximum is {max}."
        )));
    }

    let mut parsed = Vec::with_capacity(parts.len());
    for part in parts {
        let id = part
            .trim()
            .parse::<Uuid>()
            .map_err(|_| ApiError::bad_request("Invalid calendar ID format"))?;
        parsed.push(id);
    }
    Ok(Some(parsed))
}

/// Stored events for the user's calendars, decrypted.
#[utoipa::path(
    get,
    path = "/calendar/events",
    params(("calendar_ids" = Option<String>, Query, description = "Comma-separated calendar ids")),
    responses(
        (status = 200, description = "Decrypted events", body = EventsResponse),
        (status = 400, description = "Invalid calendar ids", body = ApiError),
        (status = 401, description = "Not authenticated", body = ApiError)
    ),
    tag = "calendar"
)]
pub async fn list_events(
    user: CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<CalendarIdsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let runtime = &state.runtime;
    let requested = parse_calendar_ids(query.calendar_ids.as_deref(), MAX_CALENDARS_PER_SYNC)?;
    let calendar_ids = runtime
        .store
        .calendars
        .get_user_calendar_ids(user.id(), requested.as_deref())
        .await?;

    if calendar_ids.is_empty() {
        return Ok(Json(EventsResponse {
            events: Vec::new(),
            masters: Vec::new(),
            exceptions: Vec::new(),
        }));
    }

    let (single, masters, exceptions) = runtime.store.events.query_events(&calendar_ids).await?;

    let decrypt_all = |rows: Vec<crate::models::event::Model>| -> Vec<ClientEvent> {
        rows.iter()
            .map(|row| decrypt_stored_event(row, &runtime.crypto, user.id()))
            .collect()
    };

    Ok(Json(EventsResponse {
        events: decrypt_all(single),
        masters: decrypt_all(masters),
        exceptions: decrypt_all(exceptions),
    }))
}

/// The user's linked Google accounts.
#[utoipa::path(
    get,
    path = "/calendar/accounts",
    responses(
        (status = 200, description = "Linked accounts", body = AccountsResponse),
        (status = 401, description = "Not authenticated", body = ApiError)
    ),
    tag = "calendar"
)]
pub async fn list_google_accounts(
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<AccountsResponse>, ApiError> {
    let accounts = state
        .runtime
        .store
        .accounts
        .get_google_accounts_for_user(user.id())
        .await?;

    Ok(Json(AccountsResponse {
        accounts: accounts
            .into_iter()
            .map(|account| AccountInfo {
                id: account.id,
                email: account.email,
                name: account.name,
                needs_reauth: account.needs_reauth,
            })
            .collect(),
    }))
}

/// The user's locally known calendars.
#[utoipa::path(
    get,
    path = "/calendar/calendars",
    responses(
        (status = 200, description = "Known calendars", body = CalendarsResponse),
        (status = 401, description = "Not authenticated", body = ApiError)
    ),
    tag = "calendar"
)]
pub async fn list_google_calendars(
    user: CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<CalendarsResponse>, ApiError> {
    let calendars = state
        .runtime
        .store
        .calendars
        .get_all_calendars_for_user(user.id())
        .await?;

    Ok(Json(CalendarsResponse {
        calendars: calendars
            .into_iter()
            .map(|cal| CalendarInfo {
                id: cal.id,
                google_account_id: cal.google_account_id,
                google_calendar_id: cal.google_calendar_id,
                name: cal.name,
                color: cal.color,
                is_primary: cal.is_primary,
                access_role: cal.access_role,
            })
            .collect(),
    }))
}

/// Latest completed sync across the selected calendars.
#[utoipa::path(
    get,
    path = "/calendar/sync-status",
    params(("calendar_ids" = Option<String>, Query, description = "Comma-separated calendar ids")),
    responses(
        (status = 200, description = "Latest sync timestamp", body = SyncStatusResponse),
        (status = 401, description = "Not authenticated", body = ApiError)
    ),
    tag = "calendar"
)]
pub async fn sync_status(
    user: CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<CalendarIdsQuery>,
) -> Result<Json<SyncStatusResponse>, ApiError> {
    let runtime = &state.runtime;
    let requested = parse_calendar_ids(query.calendar_ids.as_deref(), MAX_CALENDARS_PER_SYNC)?;
    let calendar_ids = runtime
        .store
        .calendars
        .get_user_calendar_ids(user.id(), requested.as_deref())
        .await?;

    let last_sync_at = runtime
        .store
        .sync_state
        .get_latest_sync_at(&calendar_ids)
        .await?;

    Ok(Json(SyncStatusResponse { last_sync_at }))
}

/// Re-fetches the calendar list from Google for one account.
pub async fn refresh_calendars(
    user: CurrentUser,
    State(state): State<AppState>,
    Path(google_account_id): Path<Uuid>,
) -> Result<Json<RefreshCalendarsResponse>, ApiError> {
    let runtime = &state.runtime;

    let account = runtime
        .store
        .accounts
        .get_google_account(google_account_id)
        .await?
        .filter(|account| account.user_id == user.id())
        .ok_or_else(|| ApiError::not_found("Google account not found"))?;

    let calendars = runtime
        .google
        .list_calendars(user.id(), account.id)
        .await
        .map_err(|err| google_upstream_error("Refresh calendars", &err))?;

    Ok(Json(RefreshCalendarsResponse { calendars }))
}

/// Streaming sync for the requested calendars, as a server-sent event
/// stream of `events` / `sync_token` / `sync_error` / `complete` records.
pub async fn sync_calendars(
    user: CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<CalendarIdsQuery>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let requested = parse_calendar_ids(query.calendar_ids.as_deref(), MAX_CALENDARS_PER_SYNC)?
        .ok_or_else(|| ApiError::bad_request("calendar_ids is required"))?;

    let records = state
        .runtime
        .orchestrator
        .sync_user(user.id(), Some(requested))
        .await
        .map_err(sync_request_error)?;

    // Keep-alives are records in the stream itself; the orchestrator owns
    // the cadence, so no transport-level keep-alive is configured.
    let stream = UnboundedReceiverStream::new(records)
        .filter_map(|record| record.to_sse_event().map(Ok::<_, Infallible>));

    Ok(Sse::new(stream))
}

fn sync_request_error(err: SyncRequestError) -> ApiError {
    match err {
        SyncRequestError::RateLimited => ApiError::new(
            axum::http::StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            err.to_string(),
        )
        .with_retry_after(5),
        SyncRequestError::TooManyCalendars { .. } => ApiError::bad_request(&err.to_string()),
        SyncRequestError::Store(store_err) => ApiError::internal(&store_err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_calendar_ids_empty_and_none() {
        assert!(parse_calendar_ids(None, 20).unwrap().is_none());
        assert!(parse_calendar_ids(Some(""), 20).unwrap().is_none());
    }

    #[test]
    fn test_parse_calendar_ids_single_and_trimmed() {
        let id = Uuid::new_v4();
        let parsed = parse_calendar_ids(Some(&id.to_string()), 20).unwrap();
        assert_eq!(parsed, Some(vec![id]));

        let padded = format!("  {id}  ");
        let parsed = parse_calendar_ids(Some(&padded), 20).unwrap();
        assert_eq!(parsed, Some(vec![id]));
    }

    #[test]
    fn test_parse_calendar_ids_multiple() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let parsed = parse_calendar_ids(Some(&format!("{a},{b}")), 20).unwrap();
        assert_eq!(parsed, Some(vec![a, b]));
    }

    #[test]
    fn test_parse_calendar_ids_too_many() {
        let ids: Vec<String> = (0..21).map(|_| Uuid::new_v4().to_string()).collect();
        let err = parse_calendar_ids(Some(&ids.join(",")), 20).unwrap_err();
        assert!(err.message.contains("Too many"));
    }

    #[test]
    fn test_parse_calendar_ids_invalid() {
        let err = parse_calendar_ids(Some("not-a-uuid"), 20).unwrap_err();
        assert!(err.message.contains("Invalid"));
    }
}
