//! # Parley Core
//!
//! The core engine of the Parley chat-bot framework.
//!
//! This crate provides the platform-independent half of a multi-platform
//! bot: the canonical event and message model, the adapter contract, the
//! per-thread locking and subscription machinery, the dispatcher, and the
//! modal and listener lifecycle managers. Platform integrations (Slack,
//! Teams, ...) implement [`Adapter`] and live in their own crates; shared
//! state lives behind [`StateStore`].
//!
//! ## Architecture
//!
//! All inbound traffic flows through the central [`Dispatcher`]:
//!
//! ```text
//! ┌─────────────┐     ┌────────────┐     ┌────────────────────────────┐
//! │   Adapter   │────▶│ Dispatcher │────▶│ mention/subscribed/pattern │
//! │  (webhook)  │     │ (per-thread│────▶│ action/reaction/slash      │
//! └─────────────┘     │   lock)    │────▶│ modal submit/close         │
//!                     └────────────┘     └────────────────────────────┘
//!                           │
//!                     ┌─────▼──────┐
//!                     │ StateStore │  subscriptions · locks · modal state
//!                     └────────────┘
//! ```
//!
//! - **Adapters**: parse platform webhooks into [`ChatEvent`]s and render
//!   canonical types back to platform API calls
//! - **Dispatcher**: acquires the thread lock, routes on subscription state
//!   and handler filters, runs every matched handler
//! - **Thread**: the facade handlers use to reply, react, and subscribe
//! - **ModalLifecycle** / **ListenerCoordinator**: stateful round trips that
//!   outlive a single webhook
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use parley_core::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
//!     let mut dispatcher = Dispatcher::new(store, LockConfig::default());
//!
//!     dispatcher.on_mention(|ctx: MessageContext| async move {
//!         ctx.thread.subscribe().await?;
//!         ctx.thread.post("hello! I'm listening to this thread now").await?;
//!         Ok(())
//!     });
//!
//!     dispatcher.on_subscribed_message(|ctx: MessageContext| async move {
//!         ctx.thread.post(&format!("you said: {}", ctx.message.text)).await?;
//!         Ok(())
//!     });
//!
//!     // Hand Arc::new(dispatcher) to each adapter via AdapterContext.
//! }
//! ```

pub mod adapter;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod listener;
pub mod modal;
pub mod model;
pub mod store;
pub mod thread;

#[cfg(test)]
pub(crate) mod test_support;

pub use adapter::{
    Adapter, AdapterContext, BoxedAdapter, ChannelInfo, DecodedThreadId, Direction, FetchOptions,
    ModalDefinition, ModalSupport, Page, ThreadInfo, ViewHandle, WebhookRequest, WebhookResponse,
    fetch_all_messages,
};
pub use dispatcher::{
    DispatchOutcome, Dispatcher, EventContext, HandlerFilter, MessageContext, ModalSubmitContext,
};
pub use error::{ChatError, ChatResult};
pub use gate::{LockConfig, ThreadGate, ThreadGuard};
pub use listener::{
    BroadcastBus, ListenerBus, ListenerClaim, ListenerConfig, ListenerCoordinator,
    ListenerResponse, ListenerStatus,
};
pub use modal::{ModalContext, ModalLifecycle, ModalState, ModalSubmission, SubmitOutcome};
pub use model::{
    ActionEvent, Attachment, Author, ChatEvent, EventKind, FormattedText, Message, MessageEvent,
    MessageMetadata, ModalCloseEvent, ModalSubmitEvent, RawMessage, ReactionEvent,
    SlashCommandEvent, Span, ThreadId,
};
pub use store::{LockLease, MemoryStore, StateStore, StateStoreExt};
pub use thread::{MessageHandle, Thread};

/// Prelude for common imports.
pub mod prelude {
    pub use super::adapter::{Adapter, AdapterContext, BoxedAdapter, ModalDefinition};
    pub use super::dispatcher::{
        Dispatcher, EventContext, HandlerFilter, MessageContext, ModalSubmitContext,
    };
    pub use super::error::{ChatError, ChatResult};
    pub use super::gate::LockConfig;
    pub use super::modal::{ModalContext, SubmitOutcome};
    pub use super::model::{ChatEvent, Message, ThreadId};
    pub use super::store::{MemoryStore, StateStore, StateStoreExt};
    pub use super::thread::Thread;
}
