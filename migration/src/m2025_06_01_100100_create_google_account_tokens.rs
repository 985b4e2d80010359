//! Migration to create the google_account_tokens table.
//!
//! Exactly one row per account. Token columns hold ciphertext produced by
//! the crypto service under the owning user's key, never plaintext.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GoogleAccountTokens::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GoogleAccountTokens::GoogleAccountId)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GoogleAccountTokens::AccessToken)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GoogleAccountTokens::RefreshToken)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(GoogleAccountTokens::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GoogleAccountTokens::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_google_account_tokens_account")
                            .from(
                                GoogleAccountTokens::Table,
                                GoogleAccountTokens::GoogleAccountId,
                            )
                            .to(GoogleAccounts::Table, GoogleAccounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GoogleAccountTokens::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GoogleAccountTokens {
    Table,
    GoogleAccountId,
    AccessToken,
    RefreshToken,
    ExpiresAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum GoogleAccounts {
    Table,
    Id,
}
