//! Google calendar entity model
//!
//! Local handle on a remote calendar. `(google_account_id,
//! google_calendar_id)` is the natural key targeted by calendar-list
//! upserts.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "google_calendars")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub google_account_id: Uuid,

    /// Google-side calendar identifier (e.g. an email address)
    pub google_calendar_id: String,

    pub name: String,

    /// Background color reported by the calendar list
    pub color: Option<String>,

    pub is_primary: bool,

    /// Access role on the remote calendar (owner, writer, reader, ...)
    pub access_role: String,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::google_account::Entity",
        from = "Column::GoogleAccountId",
        to = "super::google_account::Column::Id"
    )]
    GoogleAccount,
    #[sea_orm(has_many = "super::event::Entity")]
    Events,
    #[sea_orm(has_one = "super::calendar_sync_state::Entity")]
    SyncState,
}

impl Related<super::google_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoogleAccount.def()
    }
}

impl Related<super::event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Events.def()
    }
}

impl Related<super::calendar_sync_state::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SyncState.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
