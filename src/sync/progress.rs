//! Typed progress records flowing from sync workers to the client stream.
//!
//! One tagged variant per record type. The SSE encoding matches the wire
//! contract: named events `events`, `sync_token`, `sync_error`, `complete`,
//! with keep-alive comment lines; `calendar_done` stays internal to the
//! orchestrator.

use axum::response::sse::Event as SseEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::gcal::client::EventDateTime;

/// Client-facing event shape, decrypted and camelCased.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClientEvent {
    pub id: String,
    pub calendar_id: Uuid,
    pub start: EventDateTime,
    pub end: EventDateTime,
    pub status: String,
    pub visibility: String,
    pub transparency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurring_event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_start_time: Option<EventDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendees: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizer: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reminders: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conference_data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(rename = "iCalUID", skip_serializing_if = "Option::is_none")]
    pub ical_uid: Option<String>,
}

/// One record in a sync run's progress stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncProgress {
    /// A page of events, serialized to the client immediately
    Events {
        calendar_id: Uuid,
        events: Vec<ClientEvent>,
    },
    /// The calendar's sync token was committed (client hint only)
    SyncToken { calendar_id: Uuid },
    /// A failure attributed to one calendar, or to the run when absent
    Error {
        #[serde(skip_serializing_if = "Option::is_none")]
        calendar_id: Option<Uuid>,
        code: String,
        message: String,
        retryable: bool,
    },
    /// Worker finished; counted by the orchestrator, not sent to clients
    CalendarDone { calendar_id: Uuid },
    /// Terminal record closing the stream
    Complete {
        total_events: usize,
        calendars_synced: usize,
    },
    /// Emitted after a silent poll interval; becomes an SSE comment line
    KeepAlive,
}

impl SyncProgress {
    /// Encodes the record for the event stream. `CalendarDone` is internal
    /// bookkeeping and produces no wire event.
    pub fn to_sse_event(&self) -> Option<SseEvent> {
        let named = |name: &str| {
            let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
            SseEvent::default().event(name).data(data)
        };

        match self {
            SyncProgress::Events { .. } => Some(named("events")),
            SyncProgress::SyncToken { .. } => Some(named("sync_token")),
            SyncProgress::Error { .. } => Some(named("sync_error")),
            SyncProgress::Complete { .. } => Some(named("complete")),
            SyncProgress::CalendarDone { .. } => None,
            SyncProgress::KeepAlive => Some(SseEvent::default().comment("keep-alive")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_record_serialization() {
        let with_calendar = SyncProgress::Error {
            calendar_id: Some(Uuid::nil()),
            code: "500".to_string(),
            message: "Failed to persist some events".to_string(),
            retryable: true,
        };
        let json = serde_json::to_value(&with_calendar).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "500");
        assert_eq!(json["retryable"], true);

        let run_level = SyncProgress::Error {
            calendar_id: None,
            code: "408".to_string(),
            message: "Sync timed out".to_string(),
            retryable: false,
        };
        let json = serde_json::to_value(&run_level).unwrap();
        assert!(json.get("calendar_id").is_none());
    }

    #[test]
    fn test_calendar_done_has_no_wire_event() {
        let record = SyncProgress::CalendarDone {
            calendar_id: Uuid::nil(),
        };
        assert!(record.to_sse_event().is_none());
    }

    #[test]
    fn test_complete_record_serialization() {
        let record = SyncProgress::Complete {
            total_events: 12,
            calendars_synced: 3,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["total_events"], 12);
        assert_eq!(json["calendars_synced"], 3);
        assert!(record.to_sse_event().is_some());
    }
}
