//! State store contract.
//!
//! The store is the only shared mutable resource in the engine: subscription
//! flags, modal state, and the per-thread lock lease all live behind this
//! trait. The same contract works whether the backend is the in-process
//! [`MemoryStore`] or a networked key-value store implemented externally.

mod memory;

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::error::{ChatError, ChatResult};
use crate::model::ThreadId;

pub use memory::MemoryStore;

/// A time-bounded exclusivity lease over a thread id.
///
/// Held for the full duration of any handler invocation for the thread. A
/// lease past `expires_at` is reclaimable by a new acquirer, which bounds
/// the blast radius of a crashed handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    /// The locked thread.
    pub thread_id: ThreadId,
    /// Holder token; release and extend are token-checked.
    pub token: String,
    /// When the lease lapses and becomes reclaimable.
    pub expires_at: SystemTime,
}

/// Key/value store with TTL, subscription flags, and a lock lease primitive.
///
/// All methods are fallible: a networked backend may be unreachable. Lock
/// acquisition is a *single attempt* — blocking/backoff lives in the thread
/// gate, not in the store.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Opens the backend connection. No-op for in-process stores.
    async fn connect(&self) -> ChatResult<()> {
        Ok(())
    }

    /// Closes the backend connection. No-op for in-process stores.
    async fn disconnect(&self) -> ChatResult<()> {
        Ok(())
    }

    /// Reads a value, honoring TTL expiry.
    async fn get(&self, key: &str) -> ChatResult<Option<Value>>;

    /// Writes a value with an optional time-to-live.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> ChatResult<()>;

    /// Deletes a key. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> ChatResult<()>;

    /// Marks a thread as subscribed.
    async fn subscribe(&self, thread_id: &ThreadId) -> ChatResult<()>;

    /// Clears a thread's subscription flag.
    async fn unsubscribe(&self, thread_id: &ThreadId) -> ChatResult<()>;

    /// Whether the thread is currently subscribed.
    async fn is_subscribed(&self, thread_id: &ThreadId) -> ChatResult<bool>;

    /// Attempts to acquire the thread lock once.
    ///
    /// Succeeds iff no lease exists or the existing lease is past its
    /// `expires_at` (reclaim-on-expiry). Returns `None` when the lock is
    /// held by a live lease.
    async fn acquire_lock(
        &self,
        thread_id: &ThreadId,
        ttl: Duration,
    ) -> ChatResult<Option<LockLease>>;

    /// Releases a lease. A stale token (already reclaimed) is a no-op.
    async fn release_lock(&self, lease: &LockLease) -> ChatResult<()>;

    /// Refreshes a lease's expiry. Fails with [`ChatError::Lock`] if the
    /// lease was reclaimed by another holder.
    async fn extend_lock(&self, lease: &LockLease, ttl: Duration) -> ChatResult<LockLease>;
}

/// Typed helpers over the untyped [`StateStore`] surface.
#[async_trait]
pub trait StateStoreExt: StateStore {
    /// Reads and deserializes a value.
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> ChatResult<Option<T>> {
        match self.get(key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value).map_err(|e| {
                ChatError::Store(format!("deserialize '{key}': {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// Serializes and writes a value.
    async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> ChatResult<()> {
        let value = serde_json::to_value(value)
            .map_err(|e| ChatError::Store(format!("serialize '{key}': {e}")))?;
        self.set(key, value, ttl).await
    }
}

impl<S: StateStore + ?Sized> StateStoreExt for S {}
