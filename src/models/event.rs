//! Event entity model
//!
//! Rows are created and updated exclusively by the sync engine, upserted by
//! the `(google_calendar_id, google_event_id, source)` natural key.
//! `summary`, `description` and `location` hold per-user ciphertext.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "events")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub google_calendar_id: Uuid,

    #[sea_orm(primary_key, auto_increment = false)]
    pub google_event_id: String,

    /// Origin of the row; always "google" for synced events
    #[sea_orm(primary_key, auto_increment = false)]
    pub source: String,

    /// Encrypted summary; the transform substitutes "(No title)" when absent
    pub summary: String,

    /// Encrypted description, absent when the event has none
    pub description: Option<String>,

    /// Encrypted location, absent when the event has none
    pub location: Option<String>,

    /// Google start object (`{date|dateTime, timeZone}`)
    #[sea_orm(column_type = "JsonBinary")]
    pub start_datetime: Option<JsonValue>,

    /// Google end object
    #[sea_orm(column_type = "JsonBinary")]
    pub end_datetime: Option<JsonValue>,

    pub is_all_day: bool,

    /// The start `date` value for all-day events
    pub all_day_date: Option<String>,

    /// RRULE lines; present iff the event is a recurring master
    #[sea_orm(column_type = "JsonBinary")]
    pub recurrence: Option<JsonValue>,

    /// Master event id for recurrence exceptions
    pub recurring_event_id: Option<String>,

    pub original_start_time: Option<String>,

    pub status: String,
    pub visibility: String,
    pub transparency: String,

    #[sea_orm(column_type = "JsonBinary")]
    pub attendees: Option<JsonValue>,

    #[sea_orm(column_type = "JsonBinary")]
    pub organizer: Option<JsonValue>,

    pub color_id: Option<String>,

    #[sea_orm(column_type = "JsonBinary")]
    pub reminders: Option<JsonValue>,

    #[sea_orm(column_type = "JsonBinary")]
    pub conference_data: Option<JsonValue>,

    pub html_link: Option<String>,

    pub ical_uid: Option<String>,

    pub etag: Option<String>,

    /// Cleared for cancelled events; everything else awaits embedding
    pub embedding_pending: bool,

    /// Google-reported creation timestamp (RFC 3339, passed through)
    pub created_at: Option<String>,

    /// Google-reported update timestamp (RFC 3339, passed through)
    pub updated_at: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::google_calendar::Entity",
        from = "Column::GoogleCalendarId",
        to = "super::google_calendar::Column::Id"
    )]
    GoogleCalendar,
}

impl Related<super::google_calendar::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoogleCalendar.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
