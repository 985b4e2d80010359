//! Migration to create the google_accounts table.
//!
//! One row per linked Google identity. `needs_reauth` is a terminal flag
//! until the user re-consents; sync refuses work for flagged accounts.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GoogleAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GoogleAccounts::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(GoogleAccounts::UserId).uuid().not_null())
                    .col(ColumnDef::new(GoogleAccounts::GoogleId).text().not_null())
                    .col(ColumnDef::new(GoogleAccounts::Email).text().not_null())
                    .col(ColumnDef::new(GoogleAccounts::Name).text().null())
                    .col(
                        ColumnDef::new(GoogleAccounts::NeedsReauth)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(GoogleAccounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(GoogleAccounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_google_accounts_user_id")
                    .table(GoogleAccounts::Table)
                    .col(GoogleAccounts::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_google_accounts_user_google")
                    .table(GoogleAccounts::Table)
                    .col(GoogleAccounts::UserId)
                    .col(GoogleAccounts::GoogleId)
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
                    .name("idx_google_accounts_user_google")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_google_accounts_user_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(GoogleAccounts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GoogleAccounts {
    Table,
    Id,
    UserId,
    GoogleId,
    Email,
    Name,
    NeedsReauth,
    CreatedAt,
    UpdatedAt,
}
