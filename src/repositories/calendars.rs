//! Calendar repository: google_calendars rows.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, JoinType, QueryFilter, QuerySelect,
    RelationTrait, Set,
};
use uuid::Uuid;

use crate::models::google_account;
use crate::models::google_calendar::{
    self, ActiveModel as CalendarActiveModel, Entity as GoogleCalendar,
};

use super::StoreError;

/// One calendar-list entry as prepared for upsert.
#[derive(Debug, Clone)]
pub struct CalendarUpsert {
    pub google_calendar_id: String,
    pub name: String,
    pub color: Option<String>,
    pub is_primary: bool,
    pub access_role: String,
}

#[derive(Clone)]
pub struct CalendarRepository {
    db: Arc<DatabaseConnection>,
}

impl CalendarRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Fetches a calendar by local id, optionally scoped to a user.
    pub async fn get_google_calendar(
        &self,
        calendar_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Option<google_calendar::Model>, StoreError> {
        let mut query = GoogleCalendar::find_by_id(calendar_id);
        if let Some(user_id) = user_id {
            query = query
                .join(
                    JoinType::InnerJoin,
                    google_calendar::Relation::GoogleAccount.def(),
                )
                .filter(google_account::Column::UserId.eq(user_id));
        }
        Ok(query.one(self.db.as_ref()).await?)
    }

    pub async fn get_all_calendars_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<google_calendar::Model>, StoreError> {
        Ok(GoogleCalendar::find()
            .join(
                JoinType::InnerJoin,
                google_calendar::Relation::GoogleAccount.def(),
            )
            .filter(google_account::Column::UserId.eq(user_id))
            .all(self.db.as_ref())
            .await?)
    }

    /// Returns the user's calendar ids, intersected with the requested set
    /// when one is given.
    pub async fn get_user_calendar_ids(
        &self,
        user_id: Uuid,
        requested: Option<&[Uuid]>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let all: Vec<Uuid> = self
            .get_all_calendars_for_user(user_id)
            .await?
            .into_iter()
            .map(|cal| cal.id)
            .collect();

        Ok(match requested {
            None => all,
            Some(requested) => all
                .into_iter()
                .filter(|id| requested.contains(id))
                .collect(),
        })
    }

    /// Upserts calendar-list entries by the `(google_account_id,
    /// google_calendar_id)` natural key and returns the stored rows.
    pub async fn upsert_calendars(
        &self,
        google_account_id: Uuid,
        entries: Vec<CalendarUpsert>,
    ) -> Result<Vec<google_calendar::Model>, StoreError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let external_ids: Vec<String> = entries
            .iter()
            .map(|e| e.google_calendar_id.clone())
            .collect();

        let rows: Vec<CalendarActiveModel> = entries
            .into_iter()
            .map(|entry| CalendarActiveModel {
                id: Set(Uuid::new_v4()),
                google_account_id: Set(google_account_id),
                google_calendar_id: Set(entry.google_calendar_id),
                name: Set(entry.name),
                color: Set(entry.color),
                is_primary: Set(entry.is_primary),
                access_role: Set(entry.access_role),
                created_at: Set(now.into()),
                updated_at: Set(now.into()),
            })
            .collect();

        GoogleCalendar::insert_many(rows)
            .on_conflict(
                OnConflict::columns([
                    google_calendar::Column::GoogleAccountId,
                    google_calendar::Column::GoogleCalendarId,
                ])
                .update_columns([
                    google_calendar::Column::Name,
                    google_calendar::Column::Color,
                    google_calendar::Column::IsPrimary,
                    google_calendar::Column::AccessRole,
                    google_calendar::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;

        Ok(GoogleCalendar::find()
            .filter(google_calendar::Column::GoogleAccountId.eq(google_account_id))
            .filter(google_calendar::Column::GoogleCalendarId.is_in(external_ids))
            .all(self.db.as_ref())
            .await?)
    }
}
