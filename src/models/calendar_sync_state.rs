//! Calendar sync state entity model
//!
//! One row per calendar, created on the first sync attempt and updated at
//! every page boundary. At any moment at most one of `sync_token` and
//! `next_page_token` determines the next events request.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "calendar_sync_state")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub google_calendar_id: Uuid,

    /// Incremental cursor from the last completed run ("" while mid-full-sync)
    pub sync_token: Option<String>,

    /// Resume cursor persisted at page boundaries during a full sync
    pub next_page_token: Option<String>,

    pub last_sync_at: Option<DateTimeWithTimeZone>,

    pub pages_fetched: Option<i32>,

    pub items_upserted: Option<i32>,

    pub sync_duration_ms: Option<i64>,

    pub full_sync_complete: bool,

    /// Watch channel fields; either all set or all absent
    pub webhook_channel_id: Option<String>,
    pub webhook_resource_id: Option<String>,
    pub webhook_channel_token: Option<String>,
    pub webhook_expires_at: Option<DateTimeWithTimeZone>,
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
