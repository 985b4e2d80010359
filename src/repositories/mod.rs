//! Store gateway for the sync core.
//!
//! Typed, row-level access to the persisted tables. All writes performed by
//! the sync engine go through these repositories; field-level crypto happens
//! at this boundary so nothing above it ever persists plaintext.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use thiserror::Error;

use crate::crypto::{CryptoError, CryptoService};

pub mod accounts;
pub mod calendars;
pub mod events;
pub mod sync_state;

pub use accounts::{AccountRepository, DecryptedTokens};
pub use calendars::{CalendarRepository, CalendarUpsert};
pub use events::EventRepository;
pub use sync_state::{SyncStateRepository, SyncStateUpdate, WebhookRegistration, WebhookRoute};

/// Errors produced by the store gateway.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    /// One or more upsert batches failed; earlier and later batches may have
    /// been persisted. Retryable: the next sync re-delivers the rows.
    #[error("failed to persist event batch {batch}")]
    Persist { batch: usize },
}

/// Facade bundling the per-table repositories over one connection pool.
#[derive(Clone)]
pub struct Store {
    pub accounts: AccountRepository,
    pub calendars: CalendarRepository,
    pub events: EventRepository,
    pub sync_state: SyncStateRepository,
}

impl Store {
    pub fn new(db: DatabaseConnection, crypto: Arc<CryptoService>) -> Self {
        let db = Arc::new(db);
        Self {
            accounts: AccountRepository::new(db.clone(), crypto),
            calendars: CalendarRepository::new(db.clone()),
            events: EventRepository::new(db.clone()),
            sync_state: SyncStateRepository::new(db),
        }
    }
}
