//! Google Calendar integration: transport client, token lifecycle, and the
//! per-account concurrency/retry controller.

use crate::error::GoogleApiError;
use crate::repositories::StoreError;

pub mod client;
pub mod limits;
pub mod token;

pub use client::{CalendarView, EventsPage, GoogleClient, PageRequest, RawEvent, WatchChannel};
pub use limits::AccountLimiter;
pub use token::TokenManager;

/// Access tokens within this buffer of expiry are refreshed eagerly.
pub const TOKEN_REFRESH_BUFFER_SECS: i64 = 5 * 60;

/// Maximum concurrent outbound Google requests per account.
pub const MAX_CONCURRENT_PER_ACCOUNT: usize = 3;

/// 403 reasons that indicate quota exhaustion rather than denied access.
pub const QUOTA_ERROR_REASONS: [&str; 3] =
    ["userRateLimitExceeded", "rateLimitExceeded", "quotaExceeded"];

/// Soft capacity of the per-account controller caches.
pub const MAX_CACHED_ACCOUNTS: usize = 100;

/// Cache size at which idle entries are reclaimed down to the soft capacity.
pub const CACHE_CLEANUP_THRESHOLD: usize = 150;

/// Page size requested from the events endpoint.
pub const EVENTS_PAGE_SIZE: u32 = 250;

/// Store failures crossing the Google-call boundary, folded into the
/// outbound error taxonomy so retry classification stays in one place.
pub(crate) fn store_error_to_google(err: StoreError) -> GoogleApiError {
    match err {
        StoreError::NotFound { .. } | StoreError::Crypto(_) => GoogleApiError::Auth { status: 401 },
        StoreError::Db(e) => GoogleApiError::Network {
            message: format!("store error: {e}"),
            timeout: false,
        },
        StoreError::Persist { batch } => GoogleApiError::Network {
            message: format!("store persist failure in batch {batch}"),
            timeout: false,
        },
    }
}
