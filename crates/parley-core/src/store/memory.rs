//! In-memory state store.
//!
//! Process-lifetime only: starts empty, never persisted. Suitable for tests
//! and single-process deployments; horizontally scaled deployments need a
//! networked backend implementing the same contract.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{ChatError, ChatResult};
use crate::model::ThreadId;

use super::{LockLease, StateStore};

struct Entry {
    value: Value,
    expires_at: Option<SystemTime>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    subscriptions: HashSet<String>,
    locks: HashMap<String, LockLease>,
}

/// In-process [`StateStore`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(&self, key: &str) -> ChatResult<Option<Value>> {
        let mut inner = self.inner.lock();
        // Lazy TTL expiry on read.
        if let Some(entry) = inner.entries.get(key)
            && let Some(expires_at) = entry.expires_at
            && expires_at <= SystemTime::now()
        {
            inner.entries.remove(key);
            return Ok(None);
        }
        Ok(inner.entries.get(key).map(|e| e.value.clone()))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> ChatResult<()> {
        let expires_at = ttl.map(|ttl| SystemTime::now() + ttl);
        self.inner
            .lock()
            .entries
            .insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> ChatResult<()> {
        self.inner.lock().entries.remove(key);
        Ok(())
    }

    async fn subscribe(&self, thread_id: &ThreadId) -> ChatResult<()> {
        self.inner
            .lock()
            .subscriptions
            .insert(thread_id.as_str().to_string());
        Ok(())
    }

    async fn unsubscribe(&self, thread_id: &ThreadId) -> ChatResult<()> {
        self.inner.lock().subscriptions.remove(thread_id.as_str());
        Ok(())
    }

    async fn is_subscribed(&self, thread_id: &ThreadId) -> ChatResult<bool> {
        Ok(self.inner.lock().subscriptions.contains(thread_id.as_str()))
    }

    async fn acquire_lock(
        &self,
        thread_id: &ThreadId,
        ttl: Duration,
    ) -> ChatResult<Option<LockLease>> {
        let mut inner = self.inner.lock();
        let now = SystemTime::now();
        if let Some(existing) = inner.locks.get(thread_id.as_str())
            && existing.expires_at > now
        {
            return Ok(None);
        }
        let lease = LockLease {
            thread_id: thread_id.clone(),
            token: Uuid::new_v4().to_string(),
            expires_at: now + ttl,
        };
        inner
            .locks
            .insert(thread_id.as_str().to_string(), lease.clone());
        Ok(Some(lease))
    }

    async fn release_lock(&self, lease: &LockLease) -> ChatResult<()> {
        let mut inner = self.inner.lock();
        // Only the holder may release; a reclaimed lease is a no-op.
        if let Some(current) = inner.locks.get(lease.thread_id.as_str())
            && current.token == lease.token
        {
            inner.locks.remove(lease.thread_id.as_str());
        }
        Ok(())
    }

    async fn extend_lock(&self, lease: &LockLease, ttl: Duration) -> ChatResult<LockLease> {
        let mut inner = self.inner.lock();
        match inner.locks.get_mut(lease.thread_id.as_str()) {
            Some(current) if current.token == lease.token => {
                current.expires_at = SystemTime::now() + ttl;
                Ok(current.clone())
            }
            _ => Err(ChatError::Lock(format!(
                "lease for thread '{}' was reclaimed",
                lease.thread_id
            ))),
        }
    }
}
