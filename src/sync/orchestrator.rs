//! Streaming sync fan-out.
//!
//! One worker per calendar under a global concurrency bound, multiplexed
//! into a single ordered record stream. The orchestrator never terminates
//! the stream on a worker failure; every failure is a `sync_error` record.
//! Silence longer than the poll interval produces a keep-alive, and a
//! wall-clock ceiling converts the run into a timeout error plus a final
//! `complete` record.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::repositories::{Store, StoreError};

use super::engine::SyncEngine;
use super::progress::SyncProgress;

/// Tunables for a sync run. Defaults are the production values; tests
/// shrink the durations.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Hard cap on calendars per request
    pub max_calendars_per_sync: usize,
    /// Global bound on concurrently syncing calendars
    pub max_concurrent_calendar_fetches: usize,
    /// Wall-clock ceiling for the whole run
    pub max_sync_duration: Duration,
    /// Silence interval after which a keep-alive is emitted
    pub keep_alive_interval: Duration,
    /// Minimum spacing between runs for one user
    pub user_rate_limit_ttl: Duration,
    /// Capacity of the recent-sync LRU
    pub user_rate_limit_capacity: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_calendars_per_sync: 20,
            max_concurrent_calendar_fetches: 5,
            max_sync_duration: Duration::from_secs(300),
            keep_alive_interval: Duration::from_secs(15),
            user_rate_limit_ttl: Duration::from_secs(5),
            user_rate_limit_capacity: 1024,
        }
    }
}

/// Rejections raised before any worker starts.
#[derive(Debug, Error)]
pub enum SyncRequestError {
    #[error("Too many calendars. Maximum is {max}.")]
    TooManyCalendars { max: usize },
    #[error("Sync rate limit exceeded. Please wait before syncing again.")]
    RateLimited,
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub struct SyncOrchestrator {
    engine: Arc<SyncEngine>,
    store: Store,
    config: OrchestratorConfig,
    recent_syncs: Mutex<LruCache<Uuid, Instant>>,
}

impl SyncOrchestrator {
    pub fn new(engine: Arc<SyncEngine>, store: Store, config: OrchestratorConfig) -> Self {
        let capacity = NonZeroUsize::new(config.user_rate_limit_capacity.max(1))
            .expect("capacity is at least 1");
        Self {
            engine,
            store,
            config,
            recent_syncs: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Starts a sync run for a user and returns its record stream. The
    /// stream always ends with a `complete` record; dropping the receiver
    /// cancels all workers.
    #[instrument(skip(self, requested), fields(user_id = %user_id))]
    pub async fn sync_user(
        &self,
        user_id: Uuid,
        requested: Option<Vec<Uuid>>,
    ) -> Result<UnboundedReceiver<SyncProgress>, SyncRequestError> {
        self.check_rate_limit(user_id)?;

        let calendar_ids = self
            .store
            .calendars
            .get_user_calendar_ids(user_id, requested.as_deref())
            .await?;

        if calendar_ids.len() > self.config.max_calendars_per_sync {
            return Err(SyncRequestError::TooManyCalendars {
                max: self.config.max_calendars_per_sync,
            });
        }

        info!(calendars = calendar_ids.len(), "Starting sync run");
        counter!("sync_user_runs_total").increment(1);

        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_calendar_fetches));
        let mut workers = Vec::with_capacity(calendar_ids.len());
        for calendar_id in &calendar_ids {
            let calendar_id = *calendar_id;
            let engine = self.engine.clone();
            let semaphore = semaphore.clone();
            let tx = worker_tx.clone();
            workers.push(tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire().await else {
                    return;
                };
                engine.sync_calendar(user_id, calendar_id, Some(tx)).await;
            }));
        }
        drop(worker_tx);

        let config = self.config.clone();
        let expected = calendar_ids.len();
        tokio::spawn(multiplex(worker_rx, out_tx, workers, expected, config));

        Ok(out_rx)
    }

    /// Admits at most one run per user within the TTL window. Check and
    /// stamp happen under one short lock so concurrent requests cannot both
    /// pass.
    fn check_rate_limit(&self, user_id: Uuid) -> Result<(), SyncRequestError> {
        let mut cache = self
            .recent_syncs
            .lock()
            .expect("rate limit cache mutex poisoned");

        if let Some(last) = cache.get(&user_id)
            && last.elapsed() < self.config.user_rate_limit_ttl
        {
            counter!("sync_user_rate_limited_total").increment(1);
            return Err(SyncRequestError::RateLimited);
        }

        cache.put(user_id, Instant::now());
        Ok(())
    }
}

/// Serializes worker output into the client stream: counts completions,
/// totals emitted events, inserts keep-alives, enforces the wall clock, and
/// always finishes with `complete`.
async fn multiplex(
    mut worker_rx: UnboundedReceiver<SyncProgress>,
    out: UnboundedSender<SyncProgress>,
    workers: Vec<JoinHandle<()>>,
    expected_calendars: usize,
    config: OrchestratorConfig,
) {
    let started = Instant::now();
    let mut calendars_done = 0usize;
    let mut total_events = 0usize;

    while calendars_done < expected_calendars {
        if started.elapsed() >= config.max_sync_duration {
            counter!("sync_user_timeouts_total").increment(1);
            let _ = out.send(SyncProgress::Error {
                calendar_id: None,
                code: "408".to_string(),
                message: "Sync timed out".to_string(),
                retryable: false,
            });
            break;
        }

        match timeout(config.keep_alive_interval, worker_rx.recv()).await {
            Err(_) => {
                if out.send(SyncProgress::KeepAlive).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Ok(Some(record)) => {
                match &record {
                    SyncProgress::CalendarDone { .. } => calendars_done += 1,
                    SyncProgress::Events { events, .. } => total_events += events.len(),
                    _ => {}
                }
                if out.send(record).is_err() {
                    // Client went away; stop consuming and cancel workers.
                    break;
                }
            }
        }
    }

    for worker in &workers {
        worker.abort();
    }

    let _ = out.send(SyncProgress::Complete {
        total_events,
        calendars_synced: calendars_done,
    });
}
