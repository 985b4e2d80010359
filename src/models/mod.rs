//! # Data Models
//!
//! This module contains the SeaORM entities for the calendar sync store.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod calendar_sync_state;
pub mod event;
pub mod google_account;
pub mod google_account_token;
pub mod google_calendar;

pub use calendar_sync_state::Entity as CalendarSyncState;
pub use event::Entity as Event;
pub use google_account::Entity as GoogleAccount;
pub use google_account_token::Entity as GoogleAccountToken;
pub use google_calendar::Entity as GoogleCalendar;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "chronos-sync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
