//! Event repository: upsert batches and the three-way read split.

use std::sync::Arc;

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{error, info};
use uuid::Uuid;

use crate::models::event::{self, ActiveModel as EventActiveModel, Entity as Event};

use super::StoreError;

/// Maximum rows per upsert statement.
const UPSERT_BATCH_SIZE: usize = 500;

#[derive(Clone)]
pub struct EventRepository {
    db: Arc<DatabaseConnection>,
}

impl EventRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Upserts events by the `(google_calendar_id, google_event_id, source)`
    /// natural key in batches of at most 500.
    ///
    /// Batches fail independently: a failed batch does not prevent later
    /// batches from being attempted. When any batch failed the call returns
    /// a retryable persist error carrying the first failed batch index; rows
    /// from successful batches are already stored.
    pub async fn upsert_events(&self, events: Vec<EventActiveModel>) -> Result<u64, StoreError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut total: u64 = 0;
        let mut first_failed_batch: Option<usize> = None;
        let batches: Vec<Vec<EventActiveModel>> = events
            .chunks(UPSERT_BATCH_SIZE)
            .map(|chunk| chunk.to_vec())
            .collect();
        let batch_count = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            let batch_len = batch.len() as u64;
            let result = Event::insert_many(batch)
                .on_conflict(
                    OnConflict::columns([
                        event::Column::GoogleCalendarId,
                        event::Column::GoogleEventId,
                        event::Column::Source,
                    ])
                    .update_columns([
                        event::Column::Summary,
                        event::Column::Description,
                        event::Column::Location,
                        event::Column::StartDatetime,
                        event::Column::EndDatetime,
                        event::Column::IsAllDay,
                        event::Column::AllDayDate,
                        event::Column::Recurrence,
                        event::Column::RecurringEventId,
                        event::Column::OriginalStartTime,
                        event::Column::Status,
                        event::Column::Visibility,
                        event::Column::Transparency,
                        event::Column::Attendees,
                        event::Column::Organizer,
                        event::Column::ColorId,
                        event::Column::Reminders,
                        event::Column::ConferenceData,
                        event::Column::HtmlLink,
                        event::Column::IcalUid,
                        event::Column::Etag,
                        event::Column::EmbeddingPending,
                        event::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec(self.db.as_ref())
                .await;

            match result {
                Ok(_) => {
                    total += batch_len;
                    info!(
                        batch = index + 1,
                        batches = batch_count,
                        batch_size = batch_len,
                        total,
                        "Upserted events batch"
                    );
                }
                Err(err) => {
                    error!(batch = index + 1, error = %err, "Event upsert batch failed");
                    first_failed_batch.get_or_insert(index);
                }
            }
        }

        match first_failed_batch {
            None => Ok(total),
            Some(batch) => Err(StoreError::Persist { batch }),
        }
    }

    /// Splits stored rows into three disjoint lists: plain events, recurring
    /// masters, and recurrence exceptions. Cancelled rows are excluded from
    /// the first two; exceptions keep them so consumers can hide the
    /// cancelled instances of a series.
    pub async fn query_events(
        &self,
        calendar_ids: &[Uuid],
    ) -> Result<(Vec<event::Model>, Vec<event::Model>, Vec<event::Model>), StoreError> {
        let base = || {
            Event::find()
                .filter(event::Column::GoogleCalendarId.is_in(calendar_ids.iter().copied()))
                .filter(event::Column::Source.eq("google"))
        };

        let single = base()
            .filter(event::Column::Recurrence.is_null())
            .filter(event::Column::RecurringEventId.is_null())
            .filter(event::Column::Status.ne("cancelled"))
            .all(self.db.as_ref())
            .await?;

        let masters = base()
            .filter(event::Column::Recurrence.is_not_null())
            .filter(event::Column::RecurringEventId.is_null())
            .filter(event::Column::Status.ne("cancelled"))
            .all(self.db.as_ref())
            .await?;

        let exceptions = base()
            .filter(event::Column::RecurringEventId.is_not_null())
            .all(self.db.as_ref())
            .await?;

        Ok((single, masters, exceptions))
    }
}
