//! Database migrations for the Chronos sync service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_100000_create_google_accounts;
mod m2025_06_01_100100_create_google_account_tokens;
mod m2025_06_01_100200_create_google_calendars;
mod m2025_06_01_100300_create_events;
mod m2025_06_01_100400_create_calendar_sync_state;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_100000_create_google_accounts::Migration),
            Box::new(m2025_06_01_100100_create_google_account_tokens::Migration),
            Box::new(m2025_06_01_100200_create_google_calendars::Migration),
            Box::new(m2025_06_01_100300_create_events::Migration),
            Box::new(m2025_06_01_100400_create_calendar_sync_state::Migration),
        ]
    }
}
