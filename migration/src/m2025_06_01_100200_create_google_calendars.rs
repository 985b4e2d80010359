//! Migration to create the google_calendars table.
//!
//! Local handle on a remote Google calendar. `(google_account_id,
//! google_calendar_id)` is the natural key used by calendar-list upserts.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GoogleCalendars::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GoogleCalendars::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GoogleCalendars::GoogleAccountId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GoogleCalendars::GoogleCalendarId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(GoogleCalendars::Name).text().not_null())
                    .col(ColumnDef::new(GoogleCalendars::Color).text().null())
                    .col(
                        ColumnDef::new(GoogleCalendars::IsPrimary)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(GoogleCalendars::AccessRole)
                            .text()
                            .not_null()
                            .default("reader"),
                    )
                    .col(
                        ColumnDef::new(GoogleCalendars::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(GoogleCalendars::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_google_calendars_account")
                            .from(GoogleCalendars::Table, GoogleCalendars::GoogleAccountId)
                            .to(GoogleAccounts::Table, GoogleAccounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_google_calendars_account_external")
                    .table(GoogleCalendars::Table)
                    .col(GoogleCalendars::GoogleAccountId)
                    .col(GoogleCalendars::GoogleCalendarId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_google_calendars_account_external")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(GoogleCalendars::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GoogleCalendars {
    Table,
    Id,
    GoogleAccountId,
    GoogleCalendarId,
    Name,
    Color,
    IsPrimary,
    AccessRole,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum GoogleAccounts {
    Table,
    Id,
}
