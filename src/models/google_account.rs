//! Google account entity model
//!
//! One row per linked Google identity. `needs_reauth` is terminal until the
//! user re-consents; the sync engine refuses work for flagged accounts.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "google_accounts")]
pub struct Model {
    /// Unique identifier for the account link (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning application user
    pub user_id: Uuid,

    /// Google-side subject identifier
    pub google_id: String,

    /// Account email address
    pub email: String,

    /// Display name reported by Google (optional)
    pub name: Option<String>,

    /// True once a refresh has failed terminally; cleared on re-consent
    pub needs_reauth: bool,

    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::google_calendar::Entity")]
    GoogleCalendars,
    #[sea_orm(has_one = "super::google_account_token::Entity")]
    Tokens,
}

impl Related<super::google_calendar::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoogleCalendars.def()
    }
}

impl Related<super::google_account_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Tokens.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
