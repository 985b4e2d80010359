//! Per-calendar sync state machine.
//!
//! Drives pagination against the events endpoint, upserts pages in the
//! background, persists progress at every page boundary, and commits the
//! sync token once the final page lands. Within one calendar the emission
//! order is `events*` then `sync_token` then `calendar_done`; errors never
//! tear down the stream, they become records on it.
//!
//! Recovery rules, applied at most once per run each:
//! - 410 (expired sync token): clear state, restart as a full sync.
//! - retryable failure while resuming from a page token: drop the page
//!   token, restart as a full sync.
//! Anything else persists the in-flight page token for a later resume and
//! surfaces as an error record.

use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration as ChronoDuration, Utc};
use metrics::{counter, histogram};
use rand::RngCore;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::crypto::CryptoService;
use crate::error::GoogleApiError;
use crate::gcal::client::{GoogleClient, PageRequest};
use crate::models::google_calendar;
use crate::repositories::{Store, StoreError, SyncStateUpdate, WebhookRegistration};

use super::progress::SyncProgress;
use super::transform::{encrypt_events, map_event_to_client, proximity_sort, transform_events};

/// Webhook registration settings carried by the engine.
#[derive(Debug, Clone)]
pub struct WebhookSettings {
    /// Public base URL for the push endpoint; registration is skipped when
    /// unset
    pub base_url: Option<String>,
    /// Re-register when the existing channel expires within this window
    pub channel_buffer_hours: i64,
}

type ProgressSink = UnboundedSender<SyncProgress>;

enum PagesOutcome {
    Committed,
    Failed {
        error: GoogleApiError,
        current_page_token: Option<String>,
    },
}

pub struct SyncEngine {
    store: Store,
    google: Arc<GoogleClient>,
    crypto: Arc<CryptoService>,
    webhook: WebhookSettings,
}

impl SyncEngine {
    pub fn new(
        store: Store,
        google: Arc<GoogleClient>,
        crypto: Arc<CryptoService>,
        webhook: WebhookSettings,
    ) -> Self {
        Self {
            store,
            google,
            crypto,
            webhook,
        }
    }

    /// Runs one sync for a calendar. With a sink, progress records are
    /// emitted as they happen; without one (webhook-triggered runs) results
    /// are persisted silently. Always ends with a `calendar_done` record.
    #[instrument(skip(self, sink), fields(calendar_id = %calendar_id))]
    pub async fn sync_calendar(
        &self,
        user_id: Uuid,
        calendar_id: Uuid,
        sink: Option<ProgressSink>,
    ) {
        counter!("sync_runs_total").increment(1);
        let sink = sink.as_ref();

        if let Err(err) = self.run(user_id, calendar_id, sink).await {
            error!(error = %err, "Sync failed outside the Google call path");
            counter!("sync_runs_failed_total").increment(1);
            emit(
                sink,
                SyncProgress::Error {
                    calendar_id: Some(calendar_id),
                    code: "500".to_string(),
                    message: "Unexpected sync error".to_string(),
                    retryable: true,
                },
            );
        }

        emit(sink, SyncProgress::CalendarDone { calendar_id });
    }

    async fn run(
        &self,
        user_id: Uuid,
        calendar_id: Uuid,
        sink: Option<&ProgressSink>,
    ) -> Result<(), StoreError> {
        let Some(calendar) = self
            .store
            .calendars
            .get_google_calendar(calendar_id, Some(user_id))
            .await?
        else {
            emit(
                sink,
                SyncProgress::Error {
                    calendar_id: Some(calendar_id),
                    code: "404".to_string(),
                    message: "Calendar not found".to_string(),
                    retryable: false,
                },
            );
            return Ok(());
        };

        let account = self
            .store
            .accounts
            .get_google_account(calendar.google_account_id)
            .await?
            .ok_or(StoreError::NotFound {
                entity: "google account",
            })?;
        if account.needs_reauth {
            emit(
                sink,
                SyncProgress::Error {
                    calendar_id: Some(calendar_id),
                    code: "401".to_string(),
                    message: "Account needs re-authentication".to_string(),
                    retryable: false,
                },
            );
            return Ok(());
        }

        let state = self
            .store
            .sync_state
            .get_calendar_sync_state(calendar_id)
            .await?;
        let mut sync_token = state
            .as_ref()
            .and_then(|s| s.sync_token.clone())
            .filter(|t| !t.is_empty());
        let mut resume_page_token = state
            .as_ref()
            .and_then(|s| s.next_page_token.clone())
            .filter(|t| !t.is_empty());

        if resume_page_token.is_some() {
            info!(calendar = %calendar.name, "Resuming full sync from page token");
        } else if sync_token.is_some() {
            info!(calendar = %calendar.name, "Incremental sync");
        } else {
            info!(calendar = %calendar.name, "Initial full sync");
        }

        let started = Instant::now();
        let mut is_retry = false;
        let committed = loop {
            let outcome = self
                .run_pages(
                    user_id,
                    &calendar,
                    sync_token.as_deref(),
                    resume_page_token.as_deref(),
                    sink,
                    started,
                )
                .await?;

            match outcome {
                PagesOutcome::Committed => break true,
                PagesOutcome::Failed {
                    error: GoogleApiError::SyncTokenExpired,
                    ..
                } if !is_retry => {
                    info!("Sync token expired, clearing state and retrying as full sync");
                    counter!("sync_token_expired_total").increment(1);
                    self.store
                        .sync_state
                        .clear_calendar_sync_state(calendar_id)
                        .await?;
                    sync_token = None;
                    resume_page_token = None;
                    is_retry = true;
                }
                PagesOutcome::Failed { error, .. }
                    if error.retryable() && resume_page_token.is_some() && !is_retry =>
                {
                    info!(error = %error, "Page token resume failed, retrying as full sync");
                    resume_page_token = None;
                    is_retry = true;
                }
                PagesOutcome::Failed {
                    error,
                    current_page_token,
                } => {
                    if let Some(page_token) = current_page_token {
                        // Save where we got to so a later run resumes here.
                        self.store
                            .sync_state
                            .update_calendar_sync_state(
                                calendar_id,
                                sync_token.as_deref().unwrap_or(""),
                                SyncStateUpdate {
                                    page_token: Some(page_token),
                                    ..Default::default()
                                },
                            )
                            .await?;
                    }
                    warn!(error = %error, "Sync run failed");
                    counter!("sync_runs_failed_total").increment(1);
                    emit(
                        sink,
                        SyncProgress::Error {
                            calendar_id: Some(calendar_id),
                            code: error.status_code().to_string(),
                            message: error.to_string(),
                            retryable: error.retryable(),
                        },
                    );
                    break false;
                }
            }
        };

        if committed {
            self.ensure_webhook_channel(user_id, &calendar).await;
        }

        Ok(())
    }

    async fn run_pages(
        &self,
        user_id: Uuid,
        calendar: &google_calendar::Model,
        sync_token: Option<&str>,
        resume_page_token: Option<&str>,
        sink: Option<&ProgressSink>,
        started: Instant,
    ) -> Result<PagesOutcome, StoreError> {
        let calendar_id = calendar.id;
        let account_id = calendar.google_account_id;

        // First-request decision table: a saved page token always wins and a
        // saved sync token rides along untouched until the run commits.
        let mut cursor = match (sync_token, resume_page_token) {
            (_, Some(page_token)) => PageRequest::Resume(page_token.to_string()),
            (Some(token), None) => PageRequest::Incremental(token.to_string()),
            (None, None) => PageRequest::Full,
        };

        let mut upserts: JoinSet<Result<u64, StoreError>> = JoinSet::new();
        let mut current_page_token: Option<String> = None;
        let mut pages_fetched: i32 = 0;

        loop {
            let page = match self
                .google
                .fetch_events_page(user_id, account_id, &calendar.google_calendar_id, &cursor)
                .await
            {
                Ok(page) => page,
                Err(error) => {
                    upserts.abort_all();
                    while upserts.join_next().await.is_some() {}
                    return Ok(PagesOutcome::Failed {
                        error,
                        current_page_token,
                    });
                }
            };

            pages_fetched += 1;
            current_page_token = page.next_page_token.clone();

            let mut events = transform_events(page.items, calendar_id, calendar.color.as_deref());

            if !events.is_empty() {
                let repo = self.store.events.clone();
                let crypto = self.crypto.clone();
                let batch = events.clone();
                upserts.spawn(async move {
                    let rows =
                        tokio::task::spawn_blocking(move || encrypt_events(&batch, &crypto, user_id))
                            .await
                            .map_err(|_| StoreError::Persist { batch: 0 })??;
                    repo.upsert_events(rows).await
                });
            }

            if let Some(sink) = sink {
                proximity_sort(&mut events, Utc::now().date_naive());
                let client_events = events.iter().map(map_event_to_client).collect();
                emit(
                    Some(sink),
                    SyncProgress::Events {
                        calendar_id,
                        events: client_events,
                    },
                );
            }

            match page.next_page_token {
                Some(next_page_token) => {
                    // Persist the cursor so a crash after this page resumes
                    // at the next one. Upserts for this page may still be in
                    // flight; only the sync token commit waits for them.
                    self.store
                        .sync_state
                        .update_calendar_sync_state(
                            calendar_id,
                            sync_token.unwrap_or(""),
                            SyncStateUpdate {
                                page_token: Some(next_page_token.clone()),
                                pages_fetched: Some(pages_fetched),
                                ..Default::default()
                            },
                        )
                        .await?;
                    cursor = PageRequest::Resume(next_page_token);
                }
                None => {
                    let mut upsert_failed = false;
                    let mut items_upserted: u64 = 0;
                    while let Some(joined) = upserts.join_next().await {
                        match joined {
                            Ok(Ok(count)) => items_upserted += count,
                            Ok(Err(err)) => {
                                warn!(error = %err, "Event upsert task failed");
                                upsert_failed = true;
                            }
                            Err(_) => upsert_failed = true,
                        }
                    }

                    if upsert_failed {
                        // Advance the token anyway: the next incremental run
                        // re-delivers only changes, not the whole calendar.
                        warn!("Partial upsert failure, saving sync token anyway");
                        counter!("sync_partial_upsert_failure_total").increment(1);
                        emit(
                            sink,
                            SyncProgress::Error {
                                calendar_id: Some(calendar_id),
                                code: "500".to_string(),
                                message: "Failed to persist some events".to_string(),
                                retryable: true,
                            },
                        );
                    }

                    let next_sync_token = page.next_sync_token.unwrap_or_default();
                    let duration_ms = started.elapsed().as_millis() as i64;
                    self.store
                        .sync_state
                        .update_calendar_sync_state(
                            calendar_id,
                            &next_sync_token,
                            SyncStateUpdate {
                                page_token: None,
                                pages_fetched: Some(pages_fetched),
                                items_upserted: Some(items_upserted as i32),
                                sync_duration_ms: Some(duration_ms),
                                full_sync_complete: Some(true),
                            },
                        )
                        .await?;

                    histogram!("sync_duration_ms").record(duration_ms as f64);
                    histogram!("sync_pages_fetched").record(pages_fetched as f64);
                    emit(sink, SyncProgress::SyncToken { calendar_id });

                    return Ok(PagesOutcome::Committed);
                }
            }
        }
    }

    /// Registers (or refreshes) the push notification channel after a
    /// successful run. Failures never affect the sync result;
    /// `pushNotSupported` calendars simply stay poll-only.
    async fn ensure_webhook_channel(&self, user_id: Uuid, calendar: &google_calendar::Model) {
        let Some(base_url) = self.webhook.base_url.as_deref() else {
            return;
        };

        match self
            .register_webhook_channel(user_id, calendar, base_url)
            .await
        {
            Ok(true) => {
                counter!("webhook_channels_registered_total").increment(1);
            }
            Ok(false) => {}
            Err(RegisterError::Google(err))
                if err.reason() == Some("pushNotSupportedForRequestedResource") =>
            {
                info!(calendar = %calendar.name, "Webhook not supported for calendar");
            }
            Err(err) => {
                warn!(calendar = %calendar.name, error = %err, "Failed to register webhook channel");
            }
        }
    }

    async fn register_webhook_channel(
        &self,
        user_id: Uuid,
        calendar: &google_calendar::Model,
        base_url: &str,
    ) -> Result<bool, RegisterError> {
        if let Some(state) = self
            .store
            .sync_state
            .get_calendar_sync_state(calendar.id)
            .await?
            && let Some(expires_at) = state.webhook_expires_at
        {
            let buffer = Utc::now() + ChronoDuration::hours(self.webhook.channel_buffer_hours);
            if expires_at.with_timezone(&Utc) > buffer {
                return Ok(false);
            }
        }

        let channel_id = Uuid::new_v4().to_string();
        let channel_token = generate_channel_token();
        let webhook_url = format!("{}/calendar/webhook", base_url.trim_end_matches('/'));

        let channel = self
            .google
            .create_watch_channel(
                user_id,
                calendar.google_account_id,
                &calendar.google_calendar_id,
                &webhook_url,
                &channel_id,
                &channel_token,
            )
            .await?;

        self.store
            .sync_state
            .save_webhook_registration(
                calendar.id,
                WebhookRegistration {
                    channel_id,
                    resource_id: channel.resource_id,
                    channel_token,
                    expires_at: channel.expires_at,
                },
            )
            .await?;

        info!(
            calendar = %calendar.name,
            expires_at = %channel.expires_at,
            "Registered webhook channel"
        );
        Ok(true)
    }
}

#[derive(Debug, thiserror::Error)]
enum RegisterError {
    #[error(transparent)]
    Google(#[from] GoogleApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn emit(sink: Option<&ProgressSink>, record: SyncProgress) {
    if let Some(sink) = sink {
        // A closed sink means the client went away; workers keep persisting.
        let _ = sink.send(record);
    }
}

/// 32 bytes of entropy, URL-safe for the watch channel token.
fn generate_channel_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
