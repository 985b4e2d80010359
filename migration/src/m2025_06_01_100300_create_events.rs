//! Migration to create the events table.
//!
//! Upsert target for the sync engine. `(google_calendar_id,
//! google_event_id, source)` is the primary key; `summary`, `description`
//! and `location` hold per-user ciphertext.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Events::GoogleCalendarId).uuid().not_null())
                    .col(ColumnDef::new(Events::GoogleEventId).text().not_null())
                    .col(
                        ColumnDef::new(Events::Source)
                            .text()
                            .not_null()
                            .default("google"),
                    )
                    .col(ColumnDef::new(Events::Summary).text().not_null())
                    .col(ColumnDef::new(Events::Description).text().null())
                    .col(ColumnDef::new(Events::Location).text().null())
                    .col(ColumnDef::new(Events::StartDatetime).json_binary().null())
                    .col(ColumnDef::new(Events::EndDatetime).json_binary().null())
                    .col(
                        ColumnDef::new(Events::IsAllDay)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Events::AllDayDate).text().null())
                    .col(ColumnDef::new(Events::Recurrence).json_binary().null())
                    .col(ColumnDef::new(Events::RecurringEventId).text().null())
                    .col(ColumnDef::new(Events::OriginalStartTime).text().null())
                    .col(
                        ColumnDef::new(Events::Status)
                            .text()
                            .not_null()
                            .default("confirmed"),
                    )
                    .col(
                        ColumnDef::new(Events::Visibility)
                            .text()
                            .not_null()
                            .default("default"),
                    )
                    .col(
                        ColumnDef::new(Events::Transparency)
                            .text()
                            .not_null()
                            .default("opaque"),
                    )
                    .col(ColumnDef::new(Events::Attendees).json_binary().null())
                    .col(ColumnDef::new(Events::Organizer).json_binary().null())
                    .col(ColumnDef::new(Events::ColorId).text().null())
                    .col(ColumnDef::new(Events::Reminders).json_binary().null())
                    .col(ColumnDef::new(Events::ConferenceData).json_binary().null())
                    .col(ColumnDef::new(Events::HtmlLink).text().null())
                    .col(ColumnDef::new(Events::IcalUid).text().null())
                    .col(ColumnDef::new(Events::Etag).text().null())
                    .col(
                        ColumnDef::new(Events::EmbeddingPending)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Events::CreatedAt).text().null())
                    .col(ColumnDef::new(Events::UpdatedAt).text().null())
                    .primary_key(
                        Index::create()
                            .col(Events::GoogleCalendarId)
                            .col(Events::GoogleEventId)
                            .col(Events::Source),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_events_calendar")
                            .from(Events::Table, Events::GoogleCalendarId)
                            .to(GoogleCalendars::Table, GoogleCalendars::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_calendar_status")
                    .table(Events::Table)
                    .col(Events::GoogleCalendarId)
                    .col(Events::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_events_recurring_event_id")
                    .table(Events::Table)
                    .col(Events::RecurringEventId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_events_recurring_event_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_events_calendar_status").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Events {
    Table,
    GoogleCalendarId,
    GoogleEventId,
    Source,
    Summary,
    Description,
    Location,
    StartDatetime,
    EndDatetime,
    IsAllDay,
    AllDayDate,
    Recurrence,
    RecurringEventId,
    OriginalStartTime,
    Status,
    Visibility,
    Transparency,
    Attendees,
    Organizer,
    ColorId,
    Reminders,
    ConferenceData,
    HtmlLink,
    IcalUid,
    Etag,
    EmbeddingPending,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum GoogleCalendars {
    Table,
    Id,
}
