//! Modal lifecycle manager.
//!
//! Tracks open form views across the open → submit/close round trip. Some
//! platforms' submit webhook does not echo back the calling thread or
//! channel, so the engine persists a [`ModalState`] keyed by view id at open
//! time and recovers the calling context from it on submit. Flows with no
//! thread at all (slash commands) carry only a channel, stored the same way
//! under a separate context key.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::adapter::{Adapter, ModalDefinition, ViewHandle, require_modal_support};
use crate::error::{ChatError, ChatResult};
use crate::model::{ModalSubmitEvent, RawMessage, ThreadId};
use crate::store::{StateStore, StateStoreExt};

/// Views are recoverable for a day; after that the platform has long since
/// discarded them anyway.
const MODAL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

fn view_key(view_id: &str) -> String {
    format!("modal:view:{view_id}")
}

fn ctx_key(context_id: &str) -> String {
    format!("modal:ctx:{context_id}")
}

/// What triggered the modal: a thread, a bare channel, and optionally the
/// message carrying the interactive component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModalContext {
    /// The thread the opening interaction came from, if any. Slash-command
    /// flows have no thread.
    pub thread_id: Option<ThreadId>,
    /// The channel, for flows without a thread.
    pub channel_id: Option<String>,
    /// The message carrying the component that opened the modal, if any.
    pub message_id: Option<String>,
}

/// Persisted record linking an open view back to its calling context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalState {
    /// The platform's view id.
    pub view_id: String,
    /// Identifies the submit handler.
    pub callback_id: String,
    /// Links the view to its stored [`ModalContext`].
    pub context_id: String,
    /// Opaque user state carried through the round trip.
    pub private_metadata: Option<String>,
    /// The calling context, inlined for single-lookup resolution.
    pub context: ModalContext,
}

/// A resolved submission: the event plus the recovered calling context.
#[derive(Debug, Clone)]
pub struct ModalSubmission {
    /// The canonical submit event.
    pub event: ModalSubmitEvent,
    /// The persisted state, when it could be recovered.
    pub state: Option<ModalState>,
    /// The thread the modal was opened from, if any.
    pub related_thread: Option<ThreadId>,
    /// The channel the modal was opened from, if any.
    pub related_channel: Option<String>,
    /// The message carrying the opening component, if any.
    pub related_message: Option<String>,
}

/// What a submit handler wants to happen next.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// Done: delete the modal-carrying message (if one exists) and the state.
    Close,
    /// Validation failed: keep the state so the user can retry.
    Errors(HashMap<String, String>),
    /// Re-render the view in place.
    Update(ModalDefinition),
    /// Open a follow-up view on top.
    Push(ModalDefinition),
}

/// Tracks open views in the state store.
#[derive(Clone)]
pub struct ModalLifecycle {
    store: Arc<dyn StateStore>,
}

impl ModalLifecycle {
    /// Creates a lifecycle manager over the given store.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Opens a modal and persists its state.
    ///
    /// Capability-checks the adapter; platforms without modal support fail
    /// with [`ChatError::NotImplemented`]. The generated `context_id` is
    /// given to the adapter so it can embed it in the platform payload for
    /// submit webhooks that lack a view id.
    pub async fn open(
        &self,
        adapter: &dyn Adapter,
        trigger_id: &str,
        modal: ModalDefinition,
        context: ModalContext,
    ) -> ChatResult<ViewHandle> {
        let modals = require_modal_support(adapter)?;
        let context_id = Uuid::new_v4().to_string();

        self.store
            .set_json(&ctx_key(&context_id), &context, Some(MODAL_TTL))
            .await?;

        let handle = modals.open_modal(trigger_id, &modal, &context_id).await?;

        let state = ModalState {
            view_id: handle.view_id.clone(),
            callback_id: modal.callback_id.clone(),
            context_id,
            private_metadata: modal.private_metadata.clone(),
            context,
        };
        self.store
            .set_json(&view_key(&handle.view_id), &state, Some(MODAL_TTL))
            .await?;

        debug!(view_id = %handle.view_id, callback_id = %modal.callback_id, "Modal opened");
        Ok(handle)
    }

    /// Resolves a submit event into its calling context.
    ///
    /// Prefers the view-id lookup; falls back to the context id the adapter
    /// embedded in `private_metadata` for platforms that do not propagate a
    /// view id.
    pub async fn resolve(&self, event: &ModalSubmitEvent) -> ChatResult<ModalSubmission> {
        let state = match &event.view_id {
            Some(view_id) => self.store.get_json::<ModalState>(&view_key(view_id)).await?,
            None => None,
        };

        let state = match state {
            Some(state) => Some(state),
            None => self.resolve_from_metadata(event).await?,
        };

        let context = state.as_ref().map(|s| s.context.clone()).unwrap_or_default();
        Ok(ModalSubmission {
            event: event.clone(),
            related_thread: context.thread_id,
            related_channel: context.channel_id,
            related_message: context.message_id,
            state,
        })
    }

    async fn resolve_from_metadata(
        &self,
        event: &ModalSubmitEvent,
    ) -> ChatResult<Option<ModalState>> {
        let Some(context_id) = event.private_metadata.as_deref() else {
            return Ok(None);
        };
        let Some(context) = self
            .store
            .get_json::<ModalContext>(&ctx_key(context_id))
            .await?
        else {
            warn!(context_id = %context_id, "Modal context not found for submitted metadata");
            return Ok(None);
        };
        Ok(Some(ModalState {
            view_id: event.view_id.clone().unwrap_or_default(),
            callback_id: event.callback_id.clone(),
            context_id: context_id.to_string(),
            private_metadata: event.private_metadata.clone(),
            context,
        }))
    }

    /// Applies a submit handler's outcome.
    pub async fn apply_outcome(
        &self,
        adapter: &dyn Adapter,
        state: &ModalState,
        outcome: SubmitOutcome,
        trigger_id: Option<&str>,
    ) -> ChatResult<()> {
        match outcome {
            SubmitOutcome::Close => self.cleanup(adapter, state).await,
            SubmitOutcome::Errors(errors) => {
                // Validation failed; the view stays open so the state must
                // survive for the retry.
                debug!(view_id = %state.view_id, fields = errors.len(), "Modal submit rejected with validation errors");
                if state.view_id.is_empty() {
                    warn!(callback_id = %state.callback_id, "No view to surface validation errors on");
                    Ok(())
                } else {
                    let modals = require_modal_support(adapter)?;
                    modals.post_validation_errors(&state.view_id, &errors).await
                }
            }
            SubmitOutcome::Update(modal) => {
                let modals = require_modal_support(adapter)?;
                let handle = modals.update_modal(&state.view_id, &modal).await?;
                self.repersist(state, &modal, handle).await
            }
            SubmitOutcome::Push(modal) => {
                let modals = require_modal_support(adapter)?;
                let trigger_id = trigger_id.ok_or_else(|| {
                    ChatError::Validation("push outcome requires a trigger id".into())
                })?;
                let handle = modals
                    .open_modal(trigger_id, &modal, &state.context_id)
                    .await?;
                self.repersist(state, &modal, handle).await
            }
        }
    }

    /// Runs the close-without-submit cleanup.
    pub async fn close(&self, adapter: &dyn Adapter, state: &ModalState) -> ChatResult<()> {
        self.cleanup(adapter, state).await
    }

    /// Looks up state for a close event, mirroring submit resolution.
    pub async fn resolve_close(
        &self,
        view_id: Option<&str>,
    ) -> ChatResult<Option<ModalState>> {
        match view_id {
            Some(view_id) => self.store.get_json::<ModalState>(&view_key(view_id)).await,
            None => Ok(None),
        }
    }

    async fn repersist(
        &self,
        old: &ModalState,
        modal: &ModalDefinition,
        handle: ViewHandle,
    ) -> ChatResult<()> {
        if handle.view_id != old.view_id && !old.view_id.is_empty() {
            self.store.delete(&view_key(&old.view_id)).await?;
        }
        let state = ModalState {
            view_id: handle.view_id.clone(),
            callback_id: modal.callback_id.clone(),
            context_id: old.context_id.clone(),
            private_metadata: modal.private_metadata.clone(),
            context: old.context.clone(),
        };
        self.store
            .set_json(&view_key(&handle.view_id), &state, Some(MODAL_TTL))
            .await?;
        debug!(view_id = %handle.view_id, "Modal state re-persisted");
        Ok(())
    }

    async fn cleanup(&self, adapter: &dyn Adapter, state: &ModalState) -> ChatResult<()> {
        if let (Some(thread_id), Some(message_id)) =
            (&state.context.thread_id, &state.context.message_id)
        {
            let carrier = RawMessage {
                id: message_id.clone(),
                thread_id: thread_id.clone(),
                raw: Value::Null,
            };
            if let Err(e) = adapter.delete_message(&carrier).await {
                warn!(message_id = %message_id, error = %e, "Failed to delete modal-carrying message");
            }
        }
        if !state.view_id.is_empty() {
            self.store.delete(&view_key(&state.view_id)).await?;
        }
        self.store.delete(&ctx_key(&state.context_id)).await?;
        debug!(view_id = %state.view_id, "Modal state cleaned up");
        Ok(())
    }
}
