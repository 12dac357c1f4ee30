//! Per-thread lock gate.
//!
//! Handler execution must be exclusive *across* horizontally scaled
//! processes, not just within one, so the lock is a lease in the state store
//! rather than an in-process mutex. The store exposes a single-attempt
//! acquire; this gate adds the blocking behavior: bounded retry with
//! exponential backoff until an overall acquire timeout.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, trace};

use crate::error::{ChatError, ChatResult};
use crate::model::ThreadId;
use crate::store::{LockLease, StateStore};

/// Tuning for lock acquisition.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Lease lifetime. A crashed handler's lease becomes reclaimable after
    /// this long.
    pub lease_ttl: Duration,
    /// First retry delay when the lock is contended.
    pub retry_initial: Duration,
    /// Backoff cap; delays double from `retry_initial` up to this.
    pub retry_max: Duration,
    /// Overall deadline for acquisition. Contention past this surfaces as a
    /// lock error and the event is dropped.
    pub acquire_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ttl: Duration::from_secs(60),
            retry_initial: Duration::from_millis(50),
            retry_max: Duration::from_secs(2),
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Wraps a [`StateStore`] to provide blocking thread-lock acquisition.
#[derive(Clone)]
pub struct ThreadGate {
    store: Arc<dyn StateStore>,
    config: LockConfig,
}

impl ThreadGate {
    /// Creates a gate over the given store.
    pub fn new(store: Arc<dyn StateStore>, config: LockConfig) -> Self {
        Self { store, config }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// Acquires the lock for `thread_id`, retrying with exponential backoff
    /// until `acquire_timeout`.
    ///
    /// A contended lock is waited on; its holder either releases it or its
    /// lease lapses and is reclaimed. Store failures propagate immediately
    /// as [`ChatError::Lock`] — they are never retried indefinitely.
    pub async fn acquire(&self, thread_id: &ThreadId) -> ChatResult<ThreadGuard> {
        let deadline = Instant::now() + self.config.acquire_timeout;
        let mut delay = self.config.retry_initial;

        loop {
            match self
                .store
                .acquire_lock(thread_id, self.config.lease_ttl)
                .await
            {
                Ok(Some(lease)) => {
                    trace!(thread_id = %thread_id, token = %lease.token, "Thread lock acquired");
                    return Ok(ThreadGuard {
                        store: Arc::clone(&self.store),
                        lease,
                        lease_ttl: self.config.lease_ttl,
                    });
                }
                Ok(None) => {
                    if Instant::now() + delay > deadline {
                        return Err(ChatError::Lock(format!(
                            "timed out acquiring lock for thread '{thread_id}'"
                        )));
                    }
                    debug!(thread_id = %thread_id, delay_ms = delay.as_millis() as u64, "Thread lock contended, backing off");
                    sleep(delay).await;
                    delay = (delay * 2).min(self.config.retry_max);
                }
                Err(e) => {
                    return Err(ChatError::Lock(format!(
                        "store failure acquiring lock for thread '{thread_id}': {e}"
                    )));
                }
            }
        }
    }
}

/// A held thread lock.
///
/// Release is explicit and async; the dispatcher releases after the handler
/// set completes, success or caught error.
pub struct ThreadGuard {
    store: Arc<dyn StateStore>,
    lease: LockLease,
    lease_ttl: Duration,
}

impl ThreadGuard {
    /// The held lease.
    pub fn lease(&self) -> &LockLease {
        &self.lease
    }

    /// Refreshes the lease so a long-running handler does not lose it to a
    /// reclaiming acquirer mid-execution.
    pub async fn extend(&mut self) -> ChatResult<()> {
        self.lease = self.store.extend_lock(&self.lease, self.lease_ttl).await?;
        Ok(())
    }

    /// Releases the lock.
    pub async fn release(self) {
        if let Err(e) = self.store.release_lock(&self.lease).await {
            tracing::warn!(thread_id = %self.lease.thread_id, error = %e, "Failed to release thread lock");
        }
    }
}

impl std::fmt::Debug for ThreadGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadGuard")
            .field("thread_id", &self.lease.thread_id)
            .field("token", &self.lease.token)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn fast_config() -> LockConfig {
        LockConfig {
            lease_ttl: Duration::from_secs(5),
            retry_initial: Duration::from_millis(5),
            retry_max: Duration::from_millis(20),
            acquire_timeout: Duration::from_millis(500),
        }
    }

    #[tokio::test]
    async fn acquire_release_reacquire() {
        let gate = ThreadGate::new(Arc::new(MemoryStore::new()), fast_config());
        let t = ThreadId::from("test:room:1");

        let guard = gate.acquire(&t).await.unwrap();
        guard.release().await;
        let guard = gate.acquire(&t).await.unwrap();
        guard.release().await;
    }

    #[tokio::test]
    async fn contended_acquire_waits_for_release() {
        let gate = ThreadGate::new(Arc::new(MemoryStore::new()), fast_config());
        let t = ThreadId::from("test:room:1");

        let guard = gate.acquire(&t).await.unwrap();

        let gate2 = gate.clone();
        let t2 = t.clone();
        let waiter = tokio::spawn(async move { gate2.acquire(&t2).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        guard.release().await;

        let second = waiter.await.unwrap().unwrap();
        second.release().await;
    }

    #[tokio::test]
    async fn acquire_times_out_under_sustained_contention() {
        let config = LockConfig {
            acquire_timeout: Duration::from_millis(50),
            ..fast_config()
        };
        let gate = ThreadGate::new(Arc::new(MemoryStore::new()), config);
        let t = ThreadId::from("test:room:1");

        let _held = gate.acquire(&t).await.unwrap();
        let err = gate.acquire(&t).await.unwrap_err();
        assert!(err.is_lock());
    }

    #[tokio::test]
    async fn extend_keeps_the_same_thread_locked() {
        let gate = ThreadGate::new(Arc::new(MemoryStore::new()), fast_config());
        let t = ThreadId::from("test:room:1");

        let mut guard = gate.acquire(&t).await.unwrap();
        let before = guard.lease().expires_at;
        guard.extend().await.unwrap();
        assert!(guard.lease().expires_at >= before);
        guard.release().await;
    }
}
