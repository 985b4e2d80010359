//! Push notification intake and debounced resync dispatch.
//!
//! Notifications are verified against the stored channel token (constant
//! time), then coalesced per calendar: a burst of notifications collapses
//! into one debounced run, and notifications arriving while a run is
//! executing queue at most one follow-up run.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::counter;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::repositories::{Store, StoreError};

use super::engine::SyncEngine;

/// Result of an accepted notification, surfaced for the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Channel id did not resolve locally (expired or foreign); dropped
    UnknownChannel,
    /// Initial `sync` handshake; nothing to do
    Handshake,
    /// A debounced resync was scheduled or queued
    Scheduled,
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("channel token mismatch")]
    TokenMismatch,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Default)]
struct DebounceState {
    /// Debounce task waiting out its delay
    pending: Option<JoinHandle<()>>,
    /// A sync for this calendar is currently executing
    syncing: bool,
    /// Trigger that arrived mid-run; at most one is kept
    queued: Option<Uuid>,
}

pub struct WebhookDispatcher {
    engine: Arc<SyncEngine>,
    store: Store,
    debounce: Duration,
    states: Mutex<HashMap<Uuid, DebounceState>>,
}

impl WebhookDispatcher {
    pub fn new(engine: Arc<SyncEngine>, store: Store, debounce: Duration) -> Self {
        Self {
            engine,
            store,
            debounce,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Processes one push notification. The channel id routes to a
    /// calendar; the carried token must match the stored one.
    #[instrument(skip(self, channel_token))]
    pub async fn handle_notification(
        self: &Arc<Self>,
        channel_id: &str,
        channel_token: Option<&str>,
        resource_state: &str,
    ) -> Result<WebhookOutcome, WebhookError> {
        let route = self
            .store
            .sync_state
            .get_sync_state_by_channel_id(channel_id)
            .await?;

        let Some(route) = route else {
            debug!(channel_id, "Notification for unknown channel, dropping");
            counter!("webhook_unknown_channel_total").increment(1);
            return Ok(WebhookOutcome::UnknownChannel);
        };

        let stored = route.channel_token.as_deref().unwrap_or("");
        let provided = channel_token.unwrap_or("");
        if stored.is_empty()
            || !bool::from(stored.as_bytes().ct_eq(provided.as_bytes()))
        {
            counter!("webhook_token_mismatch_total").increment(1);
            return Err(WebhookError::TokenMismatch);
        }

        if resource_state == "sync" {
            debug!(channel_id, "Watch channel handshake");
            return Ok(WebhookOutcome::Handshake);
        }

        counter!("webhook_notifications_total").increment(1);
        self.schedule_resync(route.calendar_id, route.user_id);
        Ok(WebhookOutcome::Scheduled)
    }

    /// Debounced, coalescing resync trigger for one calendar.
    pub fn schedule_resync(self: &Arc<Self>, calendar_id: Uuid, user_id: Uuid) {
        let mut states = self.states.lock().expect("debouncer mutex poisoned");
        let state = states.entry(calendar_id).or_default();

        if state.syncing {
            // A run is in flight; remember to go again when it finishes.
            state.queued = Some(user_id);
            return;
        }

        if let Some(pending) = state.pending.take() {
            pending.abort();
        }

        let dispatcher = self.clone();
        state.pending = Some(tokio::spawn(async move {
            dispatcher.debounced_sync(calendar_id, user_id).await;
        }));
    }

    async fn debounced_sync(self: Arc<Self>, calendar_id: Uuid, user_id: Uuid) {
        tokio::time::sleep(self.debounce).await;

        {
            let mut states = self.states.lock().expect("debouncer mutex poisoned");
            let state = states.entry(calendar_id).or_default();
            state.pending = None;
            state.syncing = true;
        }

        info!(%calendar_id, "Webhook-triggered background sync");
        // No sink: results are persisted, nothing is streamed.
        self.engine.sync_calendar(user_id, calendar_id, None).await;

        let queued = {
            let mut states = self.states.lock().expect("debouncer mutex poisoned");
            let state = states.entry(calendar_id).or_default();
            state.syncing = false;
            state.queued.take()
        };

        if let Some(queued_user) = queued {
            debug!(%calendar_id, "Running queued resync");
            self.schedule_resync(calendar_id, queued_user);
        }
    }
}
