//! Raw Google events into domain rows and client records.
//!
//! The transform stage is pure; encryption happens afterwards on the worker
//! pool so event payloads never reach the store in plaintext. Emission
//! ordering uses proximity sort: nearest to today first, dateless events
//! last. Storage ordering is unaffected.

use chrono::{DateTime, NaiveDate};
use sea_orm::Set;
use serde_json::Value as JsonValue;
use tracing::warn;
use uuid::Uuid;

use crate::crypto::{CryptoError, CryptoService};
use crate::gcal::client::{EventDateTime, RawEvent};
use crate::models::event;

use super::progress::ClientEvent;

/// A synced event after transform, before encryption. Payload fields are
/// plaintext here and nowhere below the encrypt step.
#[derive(Debug, Clone)]
pub struct TransformedEvent {
    pub google_event_id: String,
    pub google_calendar_id: Uuid,
    pub summary: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: EventDateTime,
    pub end: EventDateTime,
    pub is_all_day: bool,
    pub all_day_date: Option<String>,
    pub recurrence: Option<Vec<String>>,
    pub recurring_event_id: Option<String>,
    pub original_start_time: Option<String>,
    pub status: String,
    pub visibility: String,
    pub transparency: String,
    pub attendees: Option<JsonValue>,
    pub organizer: Option<JsonValue>,
    pub color_id: Option<String>,
    pub reminders: Option<JsonValue>,
    pub conference_data: Option<JsonValue>,
    pub html_link: Option<String>,
    pub ical_uid: Option<String>,
    pub etag: Option<String>,
    pub embedding_pending: bool,
    pub created: Option<String>,
    pub updated: Option<String>,
}

/// Transforms one page of raw events into domain rows.
pub fn transform_events(
    items: Vec<RawEvent>,
    google_calendar_id: Uuid,
    calendar_color: Option<&str>,
) -> Vec<TransformedEvent> {
    items
        .into_iter()
        .map(|raw| transform_event(raw, google_calendar_id, calendar_color))
        .collect()
}

fn transform_event(
    raw: RawEvent,
    google_calendar_id: Uuid,
    calendar_color: Option<&str>,
) -> TransformedEvent {
    // Cancelled instances of a series arrive without `start`; fall back to
    // the original occurrence time so the row keeps a usable date.
    let start = raw
        .start
        .or_else(|| raw.original_start_time.clone())
        .unwrap_or_default();
    let end = raw.end.unwrap_or_default();
    let is_all_day = start.date.is_some();

    let status = raw.status.unwrap_or_else(|| "confirmed".to_string());
    let embedding_pending = status != "cancelled";

    TransformedEvent {
        google_event_id: raw.id,
        google_calendar_id,
        summary: raw.summary.unwrap_or_else(|| "(No title)".to_string()),
        description: raw.description.filter(|d| !d.is_empty()),
        location: raw.location.filter(|l| !l.is_empty()),
        all_day_date: start.date.clone(),
        is_all_day,
        start,
        end,
        recurrence: raw.recurrence.filter(|r| !r.is_empty()),
        recurring_event_id: raw.recurring_event_id,
        original_start_time: raw
            .original_start_time
            .and_then(|ost| ost.date_time.or(ost.date)),
        status,
        visibility: raw.visibility.unwrap_or_else(|| "default".to_string()),
        transparency: raw.transparency.unwrap_or_else(|| "opaque".to_string()),
        attendees: raw.attendees,
        organizer: raw.organizer,
        color_id: raw.color_id.or_else(|| calendar_color.map(str::to_string)),
        reminders: raw.reminders,
        conference_data: raw.conference_data,
        html_link: raw.html_link,
        ical_uid: raw.ical_uid,
        etag: raw.etag,
        embedding_pending,
        created: raw.created,
        updated: raw.updated,
    }
}

/// Encrypts the payload fields and builds the upsert rows. Runs on the
/// blocking pool for large pages.
pub fn encrypt_events(
    events: &[TransformedEvent],
    crypto: &CryptoService,
    user_id: Uuid,
) -> Result<Vec<event::ActiveModel>, CryptoError> {
    let key = crypto.derive_key(user_id);

    events
        .iter()
        .map(|e| {
            let summary = crypto.encrypt_with_key(&key, &e.summary, user_id)?;
            let description = e
                .description
                .as_deref()
                .map(|d| crypto.encrypt_with_key(&key, d, user_id))
                .transpose()?;
            let location = e
                .location
                .as_deref()
                .map(|l| crypto.encrypt_with_key(&key, l, user_id))
                .transpose()?;

            Ok(event::ActiveModel {
                google_calendar_id: Set(e.google_calendar_id),
                google_event_id: Set(e.google_event_id.clone()),
                source: Set("google".to_string()),
                summary: Set(summary),
                description: Set(description),
                location: Set(location),
                start_datetime: Set(event_datetime_json(&e.start)),
                end_datetime: Set(event_datetime_json(&e.end)),
                is_all_day: Set(e.is_all_day),
                all_day_date: Set(e.all_day_date.clone()),
                recurrence: Set(e
                    .recurrence
                    .as_ref()
                    .and_then(|r| serde_json::to_value(r).ok())),
                recurring_event_id: Set(e.recurring_event_id.clone()),
                original_start_time: Set(e.original_start_time.clone()),
                status: Set(e.status.clone()),
                visibility: Set(e.visibility.clone()),
                transparency: Set(e.transparency.clone()),
                attendees: Set(e.attendees.clone()),
                organizer: Set(e.organizer.clone()),
                color_id: Set(e.color_id.clone()),
                reminders: Set(e.reminders.clone()),
                conference_data: Set(e.conference_data.clone()),
                html_link: Set(e.html_link.clone()),
                ical_uid: Set(e.ical_uid.clone()),
                etag: Set(e.etag.clone()),
                embedding_pending: Set(e.embedding_pending),
                created_at: Set(e.created.clone()),
                updated_at: Set(e.updated.clone()),
            })
        })
        .collect()
}

fn event_datetime_json(value: &EventDateTime) -> Option<JsonValue> {
    if value.is_empty() {
        return None;
    }
    serde_json::to_value(value).ok()
}

/// Sorts for emission by `(|event_date - today|, event_date)`; events with
/// no usable date sort last.
pub fn proximity_sort(events: &mut [TransformedEvent], today: NaiveDate) {
    events.sort_by_key(|e| match event_date(e) {
        Some(date) => (false, (date - today).num_days().abs(), date),
        None => (true, i64::MAX, NaiveDate::MAX),
    });
}

fn event_date(event: &TransformedEvent) -> Option<NaiveDate> {
    if let Some(date_time) = event.start.date_time.as_deref()
        && let Ok(parsed) = DateTime::parse_from_rfc3339(date_time)
    {
        return Some(parsed.date_naive());
    }
    if let Some(date) = event.start.date.as_deref()
        && let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d")
    {
        return Some(parsed);
    }
    None
}

/// Maps a transformed event into the client wire shape.
pub fn map_event_to_client(event: &TransformedEvent) -> ClientEvent {
    ClientEvent {
        id: event.google_event_id.clone(),
        calendar_id: event.google_calendar_id,
        start: event.start.clone(),
        end: event.end.clone(),
        status: event.status.clone(),
        visibility: event.visibility.clone(),
        transparency: event.transparency.clone(),
        recurrence: event.recurrence.clone(),
        recurring_event_id: event.recurring_event_id.clone(),
        original_start_time: event
            .original_start_time
            .as_deref()
            .map(rewrap_original_start),
        color_id: event.color_id.clone(),
        created: event.created.clone(),
        updated: event.updated.clone(),
        summary: event.summary.clone(),
        description: event.description.clone(),
        location: event.location.clone(),
        attendees: event.attendees.clone(),
        organizer: event.organizer.clone(),
        reminders: event.reminders.clone(),
        conference_data: event.conference_data.clone(),
        html_link: event.html_link.clone(),
        ical_uid: event.ical_uid.clone(),
    }
}

/// Decrypts a stored row into the client shape. Decryption failures fall
/// back (summary to "", the rest to absent) instead of failing the read.
pub fn decrypt_stored_event(
    row: &event::Model,
    crypto: &CryptoService,
    user_id: Uuid,
) -> ClientEvent {
    let decrypt = |value: &str, field: &str| match crypto.decrypt(value, user_id) {
        Ok(plaintext) => Some(plaintext),
        Err(_) => {
            warn!(
                google_event_id = %row.google_event_id,
                field,
                "Failed to decrypt event field"
            );
            None
        }
    };

    let parse_dt =
        |value: &Option<JsonValue>| -> EventDateTime {
            value
                .as_ref()
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default()
        };

    ClientEvent {
        id: row.google_event_id.clone(),
        calendar_id: row.google_calendar_id,
        start: parse_dt(&row.start_datetime),
        end: parse_dt(&row.end_datetime),
        status: row.status.clone(),
        visibility: row.visibility.clone(),
        transparency: row.transparency.clone(),
        recurrence: row
            .recurrence
            .as_ref()
            .and_then(|r| serde_json::from_value(r.clone()).ok()),
        recurring_event_id: row.recurring_event_id.clone(),
        original_start_time: row
            .original_start_time
            .as_deref()
            .map(rewrap_original_start),
        color_id: row.color_id.clone(),
        created: row.created_at.clone(),
        updated: row.updated_at.clone(),
        summary: decrypt(&row.summary, "summary").unwrap_or_default(),
        description: row
            .description
            .as_deref()
            .and_then(|ct| decrypt(ct, "description")),
        location: row.location.as_deref().and_then(|ct| decrypt(ct, "location")),
        attendees: row.attendees.clone(),
        organizer: row.organizer.clone(),
        reminders: row.reminders.clone(),
        conference_data: row.conference_data.clone(),
        html_link: row.html_link.clone(),
        ical_uid: row.ical_uid.clone(),
    }
}

/// The flat `original_start_time` string becomes `{date: ..}` or
/// `{dateTime: ..}` on the wire, keyed by whether it carries a time part.
fn rewrap_original_start(value: &str) -> EventDateTime {
    if value.contains('T') {
        EventDateTime {
            date_time: Some(value.to_string()),
            ..Default::default()
        }
    } else {
        EventDateTime {
            date: Some(value.to_string()),
            ..Default::default()
        }
    }
}
