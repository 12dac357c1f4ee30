//! Event dispatcher and handler registry.
//!
//! The dispatcher turns an inbound canonical event into the correct handler
//! invocations exactly once, under concurrency:
//!
//! 1. Self-authored events (`author.is_me`) are dropped before any lock or
//!    store traffic — the bot never reacts to itself.
//! 2. The thread lock is acquired through the [`ThreadGate`] so handler
//!    executions for the same thread never overlap, even across processes.
//! 3. Message events route on subscription state: subscribed threads run the
//!    `subscribed` handlers (never `mention`, so the bot cannot double-reply),
//!    unsubscribed mentions run the `mention` handlers, everything else runs
//!    the `pattern` handlers whose regex matches.
//! 4. Action/reaction/slash/modal events run every registration of the kind
//!    whose filter matches the event id; a specific-id handler and a
//!    catch-all may both fire.
//! 5. Handler errors are caught per handler and logged; they never stop the
//!    remaining handlers and never surface to the webhook response.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use tracing::{Instrument, Level, debug, span, trace, warn};

use crate::adapter::BoxedAdapter;
use crate::error::ChatResult;
use crate::gate::{LockConfig, ThreadGate, ThreadGuard};
use crate::modal::{ModalLifecycle, ModalSubmission, SubmitOutcome};
use crate::model::{ChatEvent, EventKind, Message, ThreadId};
use crate::store::StateStore;
use crate::thread::{SubscriptionCell, Thread};

/// A boxed future returned by handler callbacks.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type GuardSlot = Arc<tokio::sync::Mutex<Option<ThreadGuard>>>;

// =============================================================================
// Handler contexts
// =============================================================================

/// Context for message handlers (`mention`, `subscribed`, `pattern`).
#[derive(Clone)]
pub struct MessageContext {
    /// The thread facade bound to this event.
    pub thread: Thread,
    /// The inbound message.
    pub message: Message,
    /// The parse-time mention flag; passed through to `subscribed` handlers
    /// so they can tell addressed messages from ambient chatter.
    pub is_mention: bool,
}

/// Context for action, reaction, slash-command, and modal-close handlers.
#[derive(Clone)]
pub struct EventContext {
    /// The thread facade, when the event has a thread. Slash commands and
    /// unresolvable modal closes do not.
    pub thread: Option<Thread>,
    /// The canonical event.
    pub event: ChatEvent,
}

/// Context for modal submit handlers.
#[derive(Clone)]
pub struct ModalSubmitContext {
    /// The submission with its recovered calling context.
    pub submission: ModalSubmission,
    /// The facade for the related thread, when one was recovered.
    pub thread: Option<Thread>,
}

type MessageCallback = Arc<dyn Fn(MessageContext) -> BoxFuture<'static, ChatResult<()>> + Send + Sync>;
type EventCallback = Arc<dyn Fn(EventContext) -> BoxFuture<'static, ChatResult<()>> + Send + Sync>;
type ModalCallback =
    Arc<dyn Fn(ModalSubmitContext) -> BoxFuture<'static, ChatResult<SubmitOutcome>> + Send + Sync>;

// =============================================================================
// Filters
// =============================================================================

/// Filter for id-keyed handler kinds (actions, reactions, slash commands,
/// modal callbacks).
#[derive(Debug, Clone)]
pub enum HandlerFilter {
    /// Catch-all: matches every event of the kind.
    Any,
    /// Matches only the listed ids.
    Ids(HashSet<String>),
}

impl HandlerFilter {
    /// Builds an id-set filter.
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Ids(ids.into_iter().map(Into::into).collect())
    }

    fn matches(&self, id: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Ids(ids) => ids.contains(id),
        }
    }
}

impl From<&str> for HandlerFilter {
    fn from(id: &str) -> Self {
        Self::ids([id])
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Registered callbacks, append-ordered per kind.
#[derive(Default)]
struct Registry {
    mention: Vec<MessageCallback>,
    subscribed: Vec<MessageCallback>,
    pattern: Vec<(Regex, MessageCallback)>,
    action: Vec<(HandlerFilter, EventCallback)>,
    reaction: Vec<(HandlerFilter, EventCallback)>,
    slash: Vec<(HandlerFilter, EventCallback)>,
    modal_submit: Vec<(HandlerFilter, ModalCallback)>,
    modal_close: Vec<(HandlerFilter, EventCallback)>,
}

// =============================================================================
// Dispatch outcome
// =============================================================================

/// What the dispatcher did with an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The event was authored by the bot itself and dropped.
    DroppedSelf,
    /// The thread lock could not be acquired; the event was dropped and
    /// logged.
    LockFailed,
    /// Dispatch ran; `handlers` handlers were invoked.
    Handled {
        /// Number of handler invocations (including ones that returned an
        /// error).
        handlers: usize,
    },
}

// =============================================================================
// Dispatcher
// =============================================================================

/// The central event dispatcher.
pub struct Dispatcher {
    gate: ThreadGate,
    store: Arc<dyn StateStore>,
    modal: ModalLifecycle,
    registry: Registry,
}

impl Dispatcher {
    /// Creates a dispatcher over the given store.
    pub fn new(store: Arc<dyn StateStore>, lock_config: LockConfig) -> Self {
        Self {
            gate: ThreadGate::new(Arc::clone(&store), lock_config),
            modal: ModalLifecycle::new(Arc::clone(&store)),
            store,
            registry: Registry::default(),
        }
    }

    /// The modal lifecycle manager.
    pub fn modal(&self) -> &ModalLifecycle {
        &self.modal
    }

    /// The underlying state store.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Runs when an unsubscribed thread's message mentions the bot.
    pub fn on_mention<F, Fut>(&mut self, f: F)
    where
        F: Fn(MessageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ChatResult<()>> + Send + 'static,
    {
        self.registry
            .mention
            .push(Arc::new(move |ctx| Box::pin(f(ctx))));
    }

    /// Runs for every message in a subscribed thread.
    pub fn on_subscribed_message<F, Fut>(&mut self, f: F)
    where
        F: Fn(MessageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ChatResult<()>> + Send + 'static,
    {
        self.registry
            .subscribed
            .push(Arc::new(move |ctx| Box::pin(f(ctx))));
    }

    /// Runs when an unsubscribed, unmentioned message matches the regex.
    pub fn on_pattern<F, Fut>(&mut self, pattern: Regex, f: F)
    where
        F: Fn(MessageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ChatResult<()>> + Send + 'static,
    {
        self.registry
            .pattern
            .push((pattern, Arc::new(move |ctx| Box::pin(f(ctx)))));
    }

    /// Runs for interactive-component actions matching the filter.
    pub fn on_action<F, Fut>(&mut self, filter: HandlerFilter, f: F)
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ChatResult<()>> + Send + 'static,
    {
        self.registry
            .action
            .push((filter, Arc::new(move |ctx| Box::pin(f(ctx)))));
    }

    /// Runs for reactions matching the filter.
    pub fn on_reaction<F, Fut>(&mut self, filter: HandlerFilter, f: F)
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ChatResult<()>> + Send + 'static,
    {
        self.registry
            .reaction
            .push((filter, Arc::new(move |ctx| Box::pin(f(ctx)))));
    }

    /// Runs for slash commands matching the filter.
    pub fn on_slash_command<F, Fut>(&mut self, filter: HandlerFilter, f: F)
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ChatResult<()>> + Send + 'static,
    {
        self.registry
            .slash
            .push((filter, Arc::new(move |ctx| Box::pin(f(ctx)))));
    }

    /// Runs for modal submissions whose callback id matches the filter. The
    /// returned [`SubmitOutcome`] drives post-submit behavior.
    pub fn on_modal_submit<F, Fut>(&mut self, filter: HandlerFilter, f: F)
    where
        F: Fn(ModalSubmitContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ChatResult<SubmitOutcome>> + Send + 'static,
    {
        self.registry
            .modal_submit
            .push((filter, Arc::new(move |ctx| Box::pin(f(ctx)))));
    }

    /// Runs when a modal is dismissed without submitting.
    pub fn on_modal_close<F, Fut>(&mut self, filter: HandlerFilter, f: F)
    where
        F: Fn(EventContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ChatResult<()>> + Send + 'static,
    {
        self.registry
            .modal_close
            .push((filter, Arc::new(move |ctx| Box::pin(f(ctx)))));
    }

    // -------------------------------------------------------------------------
    // Dispatch
    // -------------------------------------------------------------------------

    /// Routes one canonical event to its matched handlers.
    pub async fn dispatch(&self, adapter: BoxedAdapter, event: ChatEvent) -> DispatchOutcome {
        let span = span!(
            Level::DEBUG,
            "dispatch",
            adapter = %adapter.name(),
            kind = ?event.kind()
        );
        async {
            if event.author().is_me {
                trace!("Dropping self-authored event");
                return DispatchOutcome::DroppedSelf;
            }

            match event {
                ChatEvent::Message(e) => {
                    self.dispatch_message(adapter, e.message).await
                }
                ChatEvent::ModalSubmit(e) => self.dispatch_modal_submit(adapter, e).await,
                ChatEvent::ModalClose(e) => self.dispatch_modal_close(adapter, e).await,
                other => self.dispatch_id_event(adapter, other).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch_message(&self, adapter: BoxedAdapter, message: Message) -> DispatchOutcome {
        let thread_id = message.thread_id.clone();
        let slot = match self.lock_thread(&thread_id).await {
            Ok(slot) => slot,
            Err(outcome) => return outcome,
        };

        // Read the subscription flag once; the cell makes it (and any
        // in-handler subscribe/unsubscribe) visible to is_subscribed()
        // without another store round trip.
        let subscribed = match self.store.is_subscribed(&thread_id).await {
            Ok(flag) => flag,
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "Subscription lookup failed, treating as unsubscribed");
                false
            }
        };
        let cell: SubscriptionCell = Arc::new(Mutex::new(Some(subscribed)));
        let thread = self.make_thread(&adapter, thread_id.clone(), &cell, &slot);

        let is_mention = message.is_mention;
        let mut handlers = 0usize;

        if subscribed {
            for callback in &self.registry.subscribed {
                handlers += 1;
                self.run_message_handler(callback, &thread, &message, is_mention)
                    .await;
            }
        } else if is_mention {
            for callback in &self.registry.mention {
                handlers += 1;
                self.run_message_handler(callback, &thread, &message, is_mention)
                    .await;
            }
        } else {
            for (pattern, callback) in &self.registry.pattern {
                if pattern.is_match(&message.text) {
                    handlers += 1;
                    self.run_message_handler(callback, &thread, &message, is_mention)
                        .await;
                }
            }
        }

        debug!(thread_id = %thread_id, subscribed, is_mention, handlers, "Message dispatched");
        Self::release(&slot).await;
        DispatchOutcome::Handled { handlers }
    }

    async fn dispatch_id_event(&self, adapter: BoxedAdapter, event: ChatEvent) -> DispatchOutcome {
        let thread_id = event.thread_id().cloned();
        let slot = match &thread_id {
            Some(thread_id) => match self.lock_thread(thread_id).await {
                Ok(slot) => slot,
                Err(outcome) => return outcome,
            },
            None => Arc::new(tokio::sync::Mutex::new(None)),
        };

        let cell: SubscriptionCell = Arc::new(Mutex::new(None));
        let thread = thread_id
            .clone()
            .map(|id| self.make_thread(&adapter, id, &cell, &slot));

        let filter_id = event.filter_id().unwrap_or_default().to_string();
        let registrations = match event.kind() {
            EventKind::Action => &self.registry.action,
            EventKind::Reaction => &self.registry.reaction,
            EventKind::SlashCommand => &self.registry.slash,
            // Message and modal kinds never reach here.
            _ => unreachable!("id-event dispatch got {:?}", event.kind()),
        };

        let mut handlers = 0usize;
        for (filter, callback) in registrations {
            if filter.matches(&filter_id) {
                handlers += 1;
                let ctx = EventContext {
                    thread: thread.clone(),
                    event: event.clone(),
                };
                if let Err(e) = callback(ctx).await {
                    warn!(filter_id = %filter_id, error = %e, "Handler failed");
                }
            }
        }

        debug!(kind = ?event.kind(), filter_id = %filter_id, handlers, "Event dispatched");
        Self::release(&slot).await;
        DispatchOutcome::Handled { handlers }
    }

    async fn dispatch_modal_submit(
        &self,
        adapter: BoxedAdapter,
        event: crate::model::ModalSubmitEvent,
    ) -> DispatchOutcome {
        let submission = match self.modal.resolve(&event).await {
            Ok(submission) => submission,
            Err(e) => {
                warn!(callback_id = %event.callback_id, error = %e, "Modal state resolution failed");
                ModalSubmission {
                    event: event.clone(),
                    state: None,
                    related_thread: None,
                    related_channel: None,
                    related_message: None,
                }
            }
        };

        // A submission is an event on its originating thread; hold that
        // thread's lock while the handlers run.
        let thread_id = submission.related_thread.clone();
        let slot = match &thread_id {
            Some(thread_id) => match self.lock_thread(thread_id).await {
                Ok(slot) => slot,
                Err(outcome) => return outcome,
            },
            None => Arc::new(tokio::sync::Mutex::new(None)),
        };

        let cell: SubscriptionCell = Arc::new(Mutex::new(None));
        let thread = thread_id.map(|id| self.make_thread(&adapter, id, &cell, &slot));

        let mut handlers = 0usize;
        for (filter, callback) in &self.registry.modal_submit {
            if filter.matches(&event.callback_id) {
                handlers += 1;
                let ctx = ModalSubmitContext {
                    submission: submission.clone(),
                    thread: thread.clone(),
                };
                match callback(ctx).await {
                    Ok(outcome) => {
                        if let Some(state) = &submission.state
                            && let Err(e) = self
                                .modal
                                .apply_outcome(
                                    adapter.as_ref(),
                                    state,
                                    outcome,
                                    event.trigger_id.as_deref(),
                                )
                                .await
                        {
                            warn!(view_id = %state.view_id, error = %e, "Failed to apply modal outcome");
                        }
                    }
                    Err(e) => {
                        warn!(callback_id = %event.callback_id, error = %e, "Modal submit handler failed");
                    }
                }
            }
        }

        debug!(callback_id = %event.callback_id, handlers, "Modal submission dispatched");
        Self::release(&slot).await;
        DispatchOutcome::Handled { handlers }
    }

    async fn dispatch_modal_close(
        &self,
        adapter: BoxedAdapter,
        event: crate::model::ModalCloseEvent,
    ) -> DispatchOutcome {
        let state = match self.modal.resolve_close(event.view_id.as_deref()).await {
            Ok(state) => state,
            Err(e) => {
                warn!(callback_id = %event.callback_id, error = %e, "Modal close resolution failed");
                None
            }
        };

        let thread_id = state.as_ref().and_then(|s| s.context.thread_id.clone());
        let slot = match &thread_id {
            Some(thread_id) => match self.lock_thread(thread_id).await {
                Ok(slot) => slot,
                Err(outcome) => return outcome,
            },
            None => Arc::new(tokio::sync::Mutex::new(None)),
        };

        let cell: SubscriptionCell = Arc::new(Mutex::new(None));
        let thread = thread_id.map(|id| self.make_thread(&adapter, id, &cell, &slot));

        let mut handlers = 0usize;
        for (filter, callback) in &self.registry.modal_close {
            if filter.matches(&event.callback_id) {
                handlers += 1;
                let ctx = EventContext {
                    thread: thread.clone(),
                    event: ChatEvent::ModalClose(event.clone()),
                };
                if let Err(e) = callback(ctx).await {
                    warn!(callback_id = %event.callback_id, error = %e, "Modal close handler failed");
                }
            }
        }

        // Close without submit runs the same cleanup as a Close outcome.
        if let Some(state) = &state
            && let Err(e) = self.modal.close(adapter.as_ref(), state).await
        {
            warn!(view_id = %state.view_id, error = %e, "Modal close cleanup failed");
        }

        Self::release(&slot).await;
        DispatchOutcome::Handled { handlers }
    }

    // -------------------------------------------------------------------------
    // Plumbing
    // -------------------------------------------------------------------------

    async fn run_message_handler(
        &self,
        callback: &MessageCallback,
        thread: &Thread,
        message: &Message,
        is_mention: bool,
    ) {
        let ctx = MessageContext {
            thread: thread.clone(),
            message: message.clone(),
            is_mention,
        };
        if let Err(e) = callback(ctx).await {
            warn!(thread_id = %message.thread_id, error = %e, "Handler failed");
        }
    }

    async fn lock_thread(&self, thread_id: &ThreadId) -> Result<GuardSlot, DispatchOutcome> {
        match self.gate.acquire(thread_id).await {
            Ok(guard) => Ok(Arc::new(tokio::sync::Mutex::new(Some(guard)))),
            Err(e) => {
                warn!(thread_id = %thread_id, error = %e, "Lock acquisition failed, dropping event");
                Err(DispatchOutcome::LockFailed)
            }
        }
    }

    fn make_thread(
        &self,
        adapter: &BoxedAdapter,
        thread_id: ThreadId,
        cell: &SubscriptionCell,
        slot: &GuardSlot,
    ) -> Thread {
        Thread::new(
            thread_id,
            Arc::clone(adapter),
            Arc::clone(&self.store),
            Arc::clone(cell),
            Arc::clone(slot),
        )
    }

    async fn release(slot: &GuardSlot) {
        if let Some(guard) = slot.lock().await.take() {
            guard.release().await;
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let r = &self.registry;
        f.debug_struct("Dispatcher")
            .field("mention", &r.mention.len())
            .field("subscribed", &r.subscribed.len())
            .field("pattern", &r.pattern.len())
            .field("action", &r.action.len())
            .field("reaction", &r.reaction.len())
            .field("slash", &r.slash.len())
            .field("modal_submit", &r.modal_submit.len())
            .field("modal_close", &r.modal_close.len())
            .finish()
    }
}
