//! Sync state repository: calendar_sync_state rows.
//!
//! The row doubles as progress bookkeeping (tokens, counters) and the watch
//! channel registration for the calendar.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};
use uuid::Uuid;

use crate::models::calendar_sync_state::{
    self, ActiveModel as SyncStateActiveModel, Entity as CalendarSyncState,
};
use crate::models::{google_account, google_calendar};

use super::StoreError;

/// Optional bookkeeping carried by a sync-state update.
#[derive(Debug, Clone, Default)]
pub struct SyncStateUpdate {
    pub page_token: Option<String>,
    pub pages_fetched: Option<i32>,
    pub items_upserted: Option<i32>,
    pub sync_duration_ms: Option<i64>,
    pub full_sync_complete: Option<bool>,
}

/// Watch channel registration persisted after a successful watch call.
#[derive(Debug, Clone)]
pub struct WebhookRegistration {
    pub channel_id: String,
    pub resource_id: String,
    pub channel_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Resolution of an inbound push notification to its calendar and owner.
#[derive(Debug, Clone)]
pub struct WebhookRoute {
    pub calendar_id: Uuid,
    pub user_id: Uuid,
    pub channel_token: Option<String>,
}

#[derive(Clone)]
pub struct SyncStateRepository {
    db: Arc<DatabaseConnection>,
}

impl SyncStateRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    pub async fn get_calendar_sync_state(
        &self,
        calendar_id: Uuid,
    ) -> Result<Option<calendar_sync_state::Model>, StoreError> {
        Ok(CalendarSyncState::find_by_id(calendar_id)
            .one(self.db.as_ref())
            .await?)
    }

    /// Upserts the progress row. `sync_token` is stored as given; the engine
    /// passes "" while a full sync is still in flight. `page_token` always
    /// overwrites, clearing the column when `None`.
    pub async fn update_calendar_sync_state(
        &self,
        calendar_id: Uuid,
        sync_token: &str,
        update: SyncStateUpdate,
    ) -> Result<(), StoreError> {
        let mut row = SyncStateActiveModel {
            google_calendar_id: Set(calendar_id),
            sync_token: Set(Some(sync_token.to_string())),
            next_page_token: Set(update.page_token),
            last_sync_at: Set(Some(Utc::now().into())),
            ..Default::default()
        };

        let mut update_columns = vec![
            calendar_sync_state::Column::SyncToken,
            calendar_sync_state::Column::NextPageToken,
            calendar_sync_state::Column::LastSyncAt,
        ];

        if let Some(pages) = update.pages_fetched {
            row.pages_fetched = Set(Some(pages));
            update_columns.push(calendar_sync_state::Column::PagesFetched);
        }
        if let Some(items) = update.items_upserted {
            row.items_upserted = Set(Some(items));
            update_columns.push(calendar_sync_state::Column::ItemsUpserted);
        }
        if let Some(duration) = update.sync_duration_ms {
            row.sync_duration_ms = Set(Some(duration));
            update_columns.push(calendar_sync_state::Column::SyncDurationMs);
        }
        if let Some(complete) = update.full_sync_complete {
            row.full_sync_complete = Set(complete);
            update_columns.push(calendar_sync_state::Column::FullSyncComplete);
        }

        CalendarSyncState::insert(row)
            .on_conflict(
                OnConflict::column(calendar_sync_state::Column::GoogleCalendarId)
                    .update_columns(update_columns)
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Drops both cursors so the next run starts a fresh full sync. Keeps
    /// counters and the webhook registration.
    pub async fn clear_calendar_sync_state(&self, calendar_id: Uuid) -> Result<(), StoreError> {
        CalendarSyncState::update_many()
            .col_expr(
                calendar_sync_state::Column::SyncToken,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                calendar_sync_state::Column::NextPageToken,
                Expr::value(Option::<String>::None),
            )
            .filter(calendar_sync_state::Column::GoogleCalendarId.eq(calendar_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(())
    }

    pub async fn save_webhook_registration(
        &self,
        calendar_id: Uuid,
        registration: WebhookRegistration,
    ) -> Result<(), StoreError> {
        let row = SyncStateActiveModel {
            google_calendar_id: Set(calendar_id),
            webhook_channel_id: Set(Some(registration.channel_id)),
            webhook_resource_id: Set(Some(registration.resource_id)),
            webhook_channel_token: Set(Some(registration.channel_token)),
            webhook_expires_at: Set(Some(registration.expires_at.into())),
            ..Default::default()
        };

        CalendarSyncState::insert(row)
            .on_conflict(
                OnConflict::column(calendar_sync_state::Column::GoogleCalendarId)
                    .update_columns([
                        calendar_sync_state::Column::WebhookChannelId,
                        calendar_sync_state::Column::WebhookResourceId,
                        calendar_sync_state::Column::WebhookChannelToken,
                        calendar_sync_state::Column::WebhookExpiresAt,
                    ])
                    .to_owned(),
            )
            .exec(self.db.as_ref())
            .await?;

        Ok(())
    }

    /// Resolves a push notification channel id to the calendar it watches
    /// and the owning user.
    pub async fn get_sync_state_by_channel_id(
        &self,
        channel_id: &str,
    ) -> Result<Option<WebhookRoute>, StoreError> {
        let state = CalendarSyncState::find()
            .filter(calendar_sync_state::Column::WebhookChannelId.eq(channel_id))
            .one(self.db.as_ref())
            .await?;

        let Some(state) = state else {
            return Ok(None);
        };

        let calendar = google_calendar::Entity::find_by_id(state.google_calendar_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(StoreError::NotFound {
                entity: "google calendar",
            })?;

        let account = google_account::Entity::find_by_id(calendar.google_account_id)
            .one(self.db.as_ref())
            .await?
            .ok_or(StoreError::NotFound {
                entity: "google account",
            })?;

        Ok(Some(WebhookRoute {
            calendar_id: state.google_calendar_id,
            user_id: account.user_id,
            channel_token: state.webhook_channel_token,
        }))
    }

    /// Most recent `last_sync_at` across the given calendars.
    pub async fn get_latest_sync_at(
        &self,
        calendar_ids: &[Uuid],
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        if calendar_ids.is_empty() {
            return Ok(None);
        }

        let row = CalendarSyncState::find()
            .filter(
                calendar_sync_state::Column::GoogleCalendarId.is_in(calendar_ids.iter().copied()),
            )
            .filter(calendar_sync_state::Column::LastSyncAt.is_not_null())
            .order_by_desc(calendar_sync_state::Column::LastSyncAt)
            .one(self.db.as_ref())
            .await?;

        Ok(row
            .and_then(|r| r.last_sync_at)
            .map(|ts| ts.with_timezone(&Utc)))
    }
}
