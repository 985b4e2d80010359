//! Per-account concurrency and retry controller.
//!
//! Two LRU maps keyed by account id: a semaphore capping concurrent
//! outbound requests and a refresh lock giving the token manager
//! single-flight refreshes. Both maps share the same soft capacity and
//! reclaim only idle entries; an entry with in-flight permits or a held
//! lock survives cleanup.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use metrics::counter;
use rand::Rng;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::time::sleep;
use tracing::warn;
use uuid::Uuid;

use crate::config::RetryPolicyConfig;
use crate::error::GoogleApiError;

use super::{CACHE_CLEANUP_THRESHOLD, MAX_CACHED_ACCOUNTS, MAX_CONCURRENT_PER_ACCOUNT};

/// Process-wide controller state, owned by the runtime.
pub struct AccountLimiter {
    retry: RetryPolicyConfig,
    semaphores: Mutex<LruCache<Uuid, Arc<Semaphore>>>,
    refresh_locks: Mutex<LruCache<Uuid, Arc<AsyncMutex<()>>>>,
}

impl AccountLimiter {
    pub fn new(retry: RetryPolicyConfig) -> Self {
        Self {
            retry,
            semaphores: Mutex::new(LruCache::unbounded()),
            refresh_locks: Mutex::new(LruCache::unbounded()),
        }
    }

    /// The request semaphore for an account (3 permits).
    pub fn account_semaphore(&self, google_account_id: Uuid) -> Arc<Semaphore> {
        cached(
            &self.semaphores,
            google_account_id,
            || Arc::new(Semaphore::new(MAX_CONCURRENT_PER_ACCOUNT)),
            |sem| sem.available_permits() < MAX_CONCURRENT_PER_ACCOUNT,
        )
    }

    /// The refresh lock for an account, shared by all token-manager callers.
    pub fn refresh_lock(&self, google_account_id: Uuid) -> Arc<AsyncMutex<()>> {
        cached(
            &self.refresh_locks,
            google_account_id,
            || Arc::new(AsyncMutex::new(())),
            |lock| lock.try_lock().is_err(),
        )
    }

    /// Runs `op` inside the account semaphore, retrying retryable failures
    /// with exponential backoff and jitter. Non-retryable errors propagate
    /// immediately; exhaustion returns the last retryable error. The permit
    /// is held across all attempts.
    pub async fn with_retry<T, F, Fut>(
        &self,
        google_account_id: Uuid,
        mut op: F,
    ) -> Result<T, GoogleApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GoogleApiError>>,
    {
        let semaphore = self.account_semaphore(google_account_id);
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|_| GoogleApiError::Network {
                message: "account semaphore closed".to_string(),
                timeout: false,
            })?;

        let max_attempts = self.retry.max_attempts.max(1);
        let mut last_error = GoogleApiError::Network {
            message: "no retry attempts configured".to_string(),
            timeout: false,
        };

        for attempt in 0..max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.retryable() => {
                    counter!("google_api_retry_total").increment(1);
                    last_error = err;
                }
                Err(err) => return Err(err),
            }

            if attempt + 1 < max_attempts {
                let delay_ms = self.retry.base_delay_ms as f64
                    * 2f64.powi(attempt as i32)
                    * rand::thread_rng().gen_range(0.5..1.5);
                warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    account = %google_account_id,
                    error = %last_error,
                    delay_ms = delay_ms as u64,
                    "Retrying Google API call"
                );
                sleep(Duration::from_millis(delay_ms as u64)).await;
            }
        }

        counter!("google_api_retries_exhausted_total").increment(1);
        Err(last_error)
    }

    #[cfg(test)]
    fn semaphore_cache_len(&self) -> usize {
        self.semaphores.lock().unwrap().len()
    }
}

/// Fetch-or-insert with LRU promotion. When the map reaches the cleanup
/// threshold, idle entries are evicted oldest-first down to the soft
/// capacity; busy entries are skipped.
fn cached<T: Clone>(
    cache: &Mutex<LruCache<Uuid, T>>,
    key: Uuid,
    factory: impl FnOnce() -> T,
    is_busy: impl Fn(&T) -> bool,
) -> T {
    let mut guard = cache.lock().expect("limiter cache mutex poisoned");

    if let Some(existing) = guard.get(&key) {
        return existing.clone();
    }

    if guard.len() >= CACHE_CLEANUP_THRESHOLD {
        cleanup(&mut guard, MAX_CACHED_ACCOUNTS, &is_busy);
    }

    let value = factory();
    guard.put(key, value.clone());
    value
}

fn cleanup<T>(cache: &mut LruCache<Uuid, T>, target: usize, is_busy: &impl Fn(&T) -> bool) {
    let mut to_remove = Vec::new();
    for (key, value) in cache.iter().rev() {
        if cache.len() - to_remove.len() <= target {
            break;
        }
        if is_busy(value) {
            continue;
        }
        to_remove.push(*key);
    }
    for key in to_remove {
        cache.pop(&key);
    }
}
