//! Migration to create the calendar_sync_state table.
//!
//! One row per calendar. At most one of `sync_token` and `next_page_token`
//! determines the next events request; webhook columns are set together.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CalendarSyncState::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CalendarSyncState::GoogleCalendarId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CalendarSyncState::SyncToken).text().null())
                    .col(
                        ColumnDef::new(CalendarSyncState::NextPageToken)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CalendarSyncState::LastSyncAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CalendarSyncState::PagesFetched)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CalendarSyncState::ItemsUpserted)
                            .integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CalendarSyncState::SyncDurationMs)
                            .big_integer()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CalendarSyncState::FullSyncComplete)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(CalendarSyncState::WebhookChannelId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CalendarSyncState::WebhookResourceId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CalendarSyncState::WebhookChannelToken)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(CalendarSyncState::WebhookExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_calendar_sync_state_calendar")
                            .from(
                                CalendarSyncState::Table,
                                CalendarSyncState::GoogleCalendarId,
                            )
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
                    .name("idx_calendar_sync_state_channel_id")
                    .table(CalendarSyncState::Table)
                    .col(CalendarSyncState::WebhookChannelId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_calendar_sync_state_channel_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(CalendarSyncState::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum CalendarSyncState {
    Table,
    GoogleCalendarId,
    SyncToken,
    NextPageToken,
    LastSyncAt,
    PagesFetched,
    ItemsUpserted,
    SyncDurationMs,
    FullSyncComplete,
    WebhookChannelId,
    WebhookResourceId,
    WebhookChannelToken,
    WebhookExpiresAt,
}

#[derive(DeriveIden)]
enum GoogleCalendars {
    Table,
    Id,
}
