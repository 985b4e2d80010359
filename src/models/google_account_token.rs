//! Google account token entity model
//!
//! Exactly one row per account. `access_token` and `refresh_token` hold
//! base64 ciphertext produced under the owning user's key, never plaintext.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "google_account_tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub google_account_id: Uuid,

    /// Encrypted access token
    pub access_token: String,

    /// Encrypted refresh token; absent when Google never issued one
    pub refresh_token: Option<String>,

    /// Access token expiry instant (UTC)
    pub expires_at: DateTimeWithTimeZone,

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
}

impl Related<super::google_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::GoogleAccount.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
