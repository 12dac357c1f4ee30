//! Thread facade handed to handlers.
//!
//! Handlers never touch the [`Adapter`] directly for basic operations; the
//! dispatcher binds a [`Thread`] to the event and hands it over. Subscription
//! reads inside a dispatching handler short-circuit to the state the
//! dispatcher already knows, so a `subscribe()` call in the same handler is
//! visible to `is_subscribed()` immediately without a second store round
//! trip.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::adapter::{Adapter, BoxedAdapter};
use crate::error::{ChatError, ChatResult};
use crate::gate::ThreadGuard;
use crate::model::{RawMessage, ThreadId};
use crate::store::StateStore;

/// Shared view of the thread's subscription state during one dispatch.
///
/// `None` means not yet read from the store.
pub(crate) type SubscriptionCell = Arc<Mutex<Option<bool>>>;

/// A conversation unit bound to the current event.
#[derive(Clone)]
pub struct Thread {
    id: ThreadId,
    adapter: BoxedAdapter,
    store: Arc<dyn StateStore>,
    subscription: SubscriptionCell,
    guard: Arc<tokio::sync::Mutex<Option<ThreadGuard>>>,
}

impl Thread {
    pub(crate) fn new(
        id: ThreadId,
        adapter: BoxedAdapter,
        store: Arc<dyn StateStore>,
        subscription: SubscriptionCell,
        guard: Arc<tokio::sync::Mutex<Option<ThreadGuard>>>,
    ) -> Self {
        Self {
            id,
            adapter,
            store,
            subscription,
            guard,
        }
    }

    /// The thread's encoded id.
    pub fn id(&self) -> &ThreadId {
        &self.id
    }

    /// The adapter owning this thread.
    pub fn adapter(&self) -> &BoxedAdapter {
        &self.adapter
    }

    /// Whether this thread is a direct message.
    pub fn is_dm(&self) -> bool {
        self.adapter.is_dm(&self.id)
    }

    /// The containing channel id, derived from the thread id.
    pub fn channel_id(&self) -> ChatResult<String> {
        self.adapter.channel_id_from_thread_id(&self.id)
    }

    /// Posts a message to this thread.
    pub async fn post(&self, text: &str) -> ChatResult<MessageHandle> {
        let raw = self.adapter.post_message(&self.id, text).await?;
        Ok(MessageHandle {
            adapter: Arc::clone(&self.adapter),
            raw,
        })
    }

    /// Shows a typing indicator, where the platform supports one.
    pub async fn start_typing(&self) -> ChatResult<()> {
        self.adapter.start_typing(&self.id).await
    }

    /// Subscribes the bot to every future message in this thread.
    pub async fn subscribe(&self) -> ChatResult<()> {
        self.store.subscribe(&self.id).await?;
        *self.subscription.lock() = Some(true);
        debug!(thread_id = %self.id, "Thread subscribed");
        Ok(())
    }

    /// Clears the subscription.
    pub async fn unsubscribe(&self) -> ChatResult<()> {
        self.store.unsubscribe(&self.id).await?;
        *self.subscription.lock() = Some(false);
        debug!(thread_id = %self.id, "Thread unsubscribed");
        Ok(())
    }

    /// Whether the thread is subscribed.
    ///
    /// Uses the dispatch-local state when available; falls back to a store
    /// read only if this dispatch never touched it.
    pub async fn is_subscribed(&self) -> ChatResult<bool> {
        if let Some(known) = *self.subscription.lock() {
            return Ok(known);
        }
        let subscribed = self.store.is_subscribed(&self.id).await?;
        *self.subscription.lock() = Some(subscribed);
        Ok(subscribed)
    }

    /// Refreshes the thread lock lease from inside a long-running handler.
    pub async fn extend_lock(&self) -> ChatResult<()> {
        let mut slot = self.guard.lock().await;
        match slot.as_mut() {
            Some(guard) => guard.extend().await,
            None => Err(ChatError::Lock(format!(
                "no lock held for thread '{}'",
                self.id
            ))),
        }
    }
}

impl std::fmt::Debug for Thread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

/// A handle to a message the bot posted, supporting follow-up operations.
#[derive(Clone)]
pub struct MessageHandle {
    adapter: Arc<dyn Adapter>,
    raw: RawMessage,
}

impl MessageHandle {
    /// Wraps an existing raw message.
    pub fn new(adapter: Arc<dyn Adapter>, raw: RawMessage) -> Self {
        Self { adapter, raw }
    }

    /// The underlying raw message.
    pub fn raw(&self) -> &RawMessage {
        &self.raw
    }

    /// The message id.
    pub fn id(&self) -> &str {
        &self.raw.id
    }

    /// Replaces the message text. Edits produce a new handle; the original
    /// message value is never mutated.
    pub async fn edit(&self, text: &str) -> ChatResult<MessageHandle> {
        let raw = self.adapter.edit_message(&self.raw, text).await?;
        Ok(MessageHandle {
            adapter: Arc::clone(&self.adapter),
            raw,
        })
    }

    /// Deletes the message.
    pub async fn delete(&self) -> ChatResult<()> {
        self.adapter.delete_message(&self.raw).await
    }

    /// Adds a reaction by normalized emoji name.
    pub async fn react(&self, emoji: &str) -> ChatResult<()> {
        self.adapter.add_reaction(&self.raw, emoji).await
    }

    /// Removes the bot's own reaction by normalized emoji name.
    pub async fn unreact(&self, emoji: &str) -> ChatResult<()> {
        self.adapter.remove_reaction(&self.raw, emoji).await
    }
}

impl std::fmt::Debug for MessageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageHandle")
            .field("id", &self.raw.id)
            .field("thread_id", &self.raw.thread_id)
            .finish()
    }
}
