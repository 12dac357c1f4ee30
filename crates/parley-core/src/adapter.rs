//! Adapter protocol contract.
//!
//! An [`Adapter`] is a platform integration (Slack, Teams, Discord, ...)
//! expressed as a capability surface. The engine only ever talks to this
//! trait: adapters parse wire payloads into the canonical model on the way
//! in and render canonical types back to platform calls on the way out.
//!
//! Optional capabilities (modal support) are modeled as sub-trait accessors
//! guarded by capability checks at call sites, not inheritance:
//!
//! ```rust,ignore
//! match adapter.modal_support() {
//!     Some(modals) => modals.open_modal(trigger_id, &modal, ctx_id).await?,
//!     None => return Err(ChatError::NotImplemented {
//!         adapter: adapter.name().to_string(),
//!         capability: "modals",
//!     }),
//! }
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::{ChatError, ChatResult};
use crate::model::{ChatEvent, FormattedText, Message, RawMessage, ThreadId};

// =============================================================================
// Webhook I/O
// =============================================================================

/// A wire-level webhook request, transport-agnostic.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    /// Request headers (lower-cased names). Signature material lives here.
    pub headers: HashMap<String, String>,
    /// Raw request body.
    pub body: Vec<u8>,
    /// Query parameters.
    pub query: HashMap<String, String>,
}

impl WebhookRequest {
    /// Builds a request from a raw body with no headers or query.
    pub fn from_body(body: impl Into<Vec<u8>>) -> Self {
        Self {
            headers: HashMap::new(),
            body: body.into(),
            query: HashMap::new(),
        }
    }
}

/// The acknowledgement an adapter returns to the platform.
///
/// Per the webhook contract, non-2xx is reserved for authentication (401)
/// and body-parse (400) failures; handler errors are swallowed into a 200
/// since most platforms retry failed webhooks and duplicate delivery is
/// worse than a swallowed handler error.
#[derive(Debug, Clone)]
pub struct WebhookResponse {
    /// HTTP status code to return.
    pub status: u16,
    /// JSON body, if the platform expects one.
    pub body: Option<Value>,
}

impl WebhookResponse {
    /// A plain 200 acknowledgement.
    pub fn ok() -> Self {
        Self {
            status: 200,
            body: None,
        }
    }

    /// A 200 acknowledgement with a JSON body.
    pub fn ok_json(body: Value) -> Self {
        Self {
            status: 200,
            body: Some(body),
        }
    }

    /// 401 for a failed signature check.
    pub fn unauthorized() -> Self {
        Self {
            status: 401,
            body: None,
        }
    }

    /// 400 for an unparseable body.
    pub fn bad_request() -> Self {
        Self {
            status: 400,
            body: None,
        }
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Fetch direction relative to the cursor position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Oldest first.
    #[default]
    Forward,
    /// Newest first (pages are still returned chronological).
    Backward,
}

/// Options for paginated message reads.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Maximum messages per page; `None` means the adapter's default.
    pub limit: Option<usize>,
    /// Direction relative to the cursor.
    pub direction: Direction,
    /// Opaque cursor from a previous page.
    pub cursor: Option<String>,
}

/// One page of results.
///
/// Items within a page are in chronological order regardless of the fetch
/// direction; ties on timestamp are broken by the platform's monotonic
/// sequence number. `next_cursor` is `None` exactly when no more items
/// exist in the requested direction.
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// The items in this page, chronological.
    pub items: Vec<T>,
    /// Cursor for the next page, if one exists.
    pub next_cursor: Option<String>,
}

// =============================================================================
// Metadata
// =============================================================================

/// Thread metadata returned by `fetch_thread`.
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    /// The thread's encoded id.
    pub thread_id: ThreadId,
    /// The containing channel.
    pub channel_id: String,
    /// Whether the thread is a direct message.
    pub is_dm: bool,
    /// Thread title, where the platform has one.
    pub title: Option<String>,
}

/// Channel metadata returned by `fetch_channel_info`.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    /// Platform-native channel id.
    pub channel_id: String,
    /// Channel name.
    pub name: String,
    /// Whether the channel is a DM.
    pub is_dm: bool,
}

/// The decoded parts of a thread id.
///
/// `decode` followed by `encode` must reproduce the original string exactly
/// (round-trip law); both are pure and never touch the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedThreadId {
    /// The containing channel or room.
    pub channel_id: String,
    /// The root message reference, absent for channel-level threads and DMs.
    pub root_message_id: Option<String>,
}

// =============================================================================
// Modal capability
// =============================================================================

/// A modal form definition.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ModalDefinition {
    /// Identifies the submit handler.
    pub callback_id: String,
    /// Title shown on the platform.
    pub title: String,
    /// Platform-agnostic block payload; adapters translate it.
    pub blocks: Value,
    /// Opaque state the platform echoes back on submit.
    pub private_metadata: Option<String>,
}

/// Handle to an opened modal view.
#[derive(Debug, Clone)]
pub struct ViewHandle {
    /// The platform's view id.
    pub view_id: String,
}

/// Optional modal capability.
#[async_trait]
pub trait ModalSupport: Send + Sync {
    /// Opens a modal using the interaction's one-shot trigger token.
    ///
    /// `context_id` links the view back to the opening thread/channel; the
    /// adapter must thread it through `private_metadata` so submit webhooks
    /// that lack a view id can still be resolved.
    async fn open_modal(
        &self,
        trigger_id: &str,
        modal: &ModalDefinition,
        context_id: &str,
    ) -> ChatResult<ViewHandle>;

    /// Replaces an open view in place.
    async fn update_modal(&self, view_id: &str, modal: &ModalDefinition) -> ChatResult<ViewHandle>;

    /// Surfaces per-field validation errors on an open view.
    ///
    /// Called when a submit handler rejects the submission; the view stays
    /// open so the user can correct and resubmit.
    async fn post_validation_errors(
        &self,
        view_id: &str,
        errors: &HashMap<String, String>,
    ) -> ChatResult<()>;
}

// =============================================================================
// Adapter trait
// =============================================================================

/// Handed to adapters at startup; the route back into the engine.
///
/// Holds the dispatcher plus the adapter's own shared handle so webhook
/// processing can dispatch without re-plumbing an `Arc<Self>`.
#[derive(Clone)]
pub struct AdapterContext {
    dispatcher: std::sync::Arc<Dispatcher>,
    adapter: BoxedAdapter,
}

impl AdapterContext {
    /// Binds a dispatcher to an adapter handle.
    pub fn new(dispatcher: std::sync::Arc<Dispatcher>, adapter: BoxedAdapter) -> Self {
        Self {
            dispatcher,
            adapter,
        }
    }

    /// Dispatches a canonical event parsed from a webhook.
    pub async fn dispatch(&self, event: ChatEvent) -> DispatchOutcome {
        self.dispatcher
            .dispatch(std::sync::Arc::clone(&self.adapter), event)
            .await
    }
}

/// The capability surface every platform integration implements.
///
/// All outbound operations propagate [`ChatError`] to the caller (a rate
/// limit on `post_message` surfaces as `AdapterRateLimit`); only inbound
/// webhook processing swallows failures into an acknowledgement.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// The platform tag ("slack", "teams", ...). Used for logging and for
    /// namespacing thread ids.
    fn name(&self) -> &str;

    /// Called once at engine startup with the route back into the engine.
    ///
    /// Adapters keep the context and use it from `handle_webhook`.
    async fn initialize(&self, _ctx: AdapterContext) -> ChatResult<()> {
        Ok(())
    }

    /// Verifies the platform signature, parses the payload into canonical
    /// events, dispatches them, and returns a platform acknowledgement.
    ///
    /// The acknowledgement is independent of handler success: only
    /// authentication and body-parse failures short-circuit to non-2xx.
    async fn handle_webhook(&self, request: WebhookRequest) -> WebhookResponse;

    /// Posts a message to a thread.
    async fn post_message(&self, thread_id: &ThreadId, text: &str) -> ChatResult<RawMessage>;

    /// Edits a message the bot previously posted.
    async fn edit_message(&self, message: &RawMessage, text: &str) -> ChatResult<RawMessage>;

    /// Deletes a message the bot previously posted.
    async fn delete_message(&self, message: &RawMessage) -> ChatResult<()>;

    /// Adds a reaction by normalized emoji name.
    async fn add_reaction(&self, message: &RawMessage, emoji: &str) -> ChatResult<()>;

    /// Removes the bot's own reaction by normalized emoji name.
    ///
    /// Adapters list the bot's current reactions first and skip the delete
    /// call when no matching reaction exists.
    async fn remove_reaction(&self, message: &RawMessage, emoji: &str) -> ChatResult<()>;

    /// Fetches a single message.
    async fn fetch_message(&self, thread_id: &ThreadId, message_id: &str) -> ChatResult<Message>;

    /// Fetches one page of a thread's messages. See [`Page`] for ordering.
    async fn fetch_messages(
        &self,
        thread_id: &ThreadId,
        options: FetchOptions,
    ) -> ChatResult<Page<Message>>;

    /// Fetches one page of a channel's top-level messages.
    async fn fetch_channel_messages(
        &self,
        channel_id: &str,
        options: FetchOptions,
    ) -> ChatResult<Page<Message>>;

    /// Fetches thread metadata.
    async fn fetch_thread(&self, thread_id: &ThreadId) -> ChatResult<ThreadInfo>;

    /// Fetches channel metadata.
    async fn fetch_channel_info(&self, channel_id: &str) -> ChatResult<ChannelInfo>;

    /// Lists threads visible to the bot in a channel.
    async fn list_threads(
        &self,
        channel_id: &str,
        options: FetchOptions,
    ) -> ChatResult<Page<ThreadInfo>>;

    /// Decodes a thread id into its platform parts. Pure; no network.
    fn decode_thread_id(&self, thread_id: &ThreadId) -> ChatResult<DecodedThreadId>;

    /// Encodes platform parts into a thread id. Pure; no network.
    /// `encode(decode(x)) == x` for every valid encoded id.
    fn encode_thread_id(&self, decoded: &DecodedThreadId) -> ThreadId;

    /// Extracts the channel id without a network call.
    fn channel_id_from_thread_id(&self, thread_id: &ThreadId) -> ChatResult<String> {
        Ok(self.decode_thread_id(thread_id)?.channel_id)
    }

    /// Whether the thread is a direct message. Pure; derived from the id.
    fn is_dm(&self, thread_id: &ThreadId) -> bool;

    /// Parses a raw platform payload into a canonical [`Message`], computing
    /// `is_mention` exactly once per the mention detection contract.
    fn parse_message(&self, raw: &Value) -> ChatResult<Message>;

    /// Renders the canonical rich-text AST to platform markup.
    fn render_formatted(&self, formatted: &FormattedText) -> String;

    /// Best-effort typing indicator. Platforms without one ignore it.
    async fn start_typing(&self, _thread_id: &ThreadId) -> ChatResult<()> {
        Ok(())
    }

    /// Returns the modal capability, if this platform supports modals.
    fn modal_support(&self) -> Option<&dyn ModalSupport> {
        None
    }
}

/// A shared adapter trait object.
pub type BoxedAdapter = std::sync::Arc<dyn Adapter>;

/// Resolves the modal capability or fails with `NotImplemented`.
pub fn require_modal_support(adapter: &dyn Adapter) -> ChatResult<&dyn ModalSupport> {
    adapter
        .modal_support()
        .ok_or_else(|| ChatError::NotImplemented {
            adapter: adapter.name().to_string(),
            capability: "modals",
        })
}

/// Walks `fetch_messages` cursors until exhaustion, returning the full
/// message set in chronological order for either direction.
///
/// Backward pagination yields the newest page first, so pages are prepended;
/// forward pagination appends. Callers racing with concurrently arriving
/// messages must re-fetch or rely on cursors — there is no ordering
/// guarantee between a fetch and new arrivals.
pub async fn fetch_all_messages(
    adapter: &dyn Adapter,
    thread_id: &ThreadId,
    direction: Direction,
    page_limit: Option<usize>,
) -> ChatResult<Vec<Message>> {
    let mut all: Vec<Message> = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        let page = adapter
            .fetch_messages(
                thread_id,
                FetchOptions {
                    limit: page_limit,
                    direction,
                    cursor: cursor.clone(),
                },
            )
            .await?;

        match direction {
            Direction::Forward => all.extend(page.items),
            Direction::Backward => {
                let mut merged = page.items;
                merged.extend(all);
                all = merged;
            }
        }

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockAdapter;

    #[tokio::test]
    async fn fetch_all_walks_forward_cursors_to_exhaustion() {
        let adapter = MockAdapter::new();
        let thread = ThreadId::from("mock:C1:root1");
        for i in 0..7 {
            adapter.seed_message(&thread, &format!("msg {i}"), i);
        }

        let all = fetch_all_messages(adapter.as_ref(), &thread, Direction::Forward, Some(3))
            .await
            .unwrap();

        assert_eq!(all.len(), 7);
        let texts: Vec<_> = all.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts[0], "msg 0");
        assert_eq!(texts[6], "msg 6");
    }

    #[tokio::test]
    async fn backward_pagination_yields_the_same_chronological_order() {
        let adapter = MockAdapter::new();
        let thread = ThreadId::from("mock:C1:root1");
        for i in 0..7 {
            adapter.seed_message(&thread, &format!("msg {i}"), i);
        }

        let forward = fetch_all_messages(adapter.as_ref(), &thread, Direction::Forward, Some(3))
            .await
            .unwrap();
        let backward = fetch_all_messages(adapter.as_ref(), &thread, Direction::Backward, Some(3))
            .await
            .unwrap();

        let f: Vec<_> = forward.iter().map(|m| m.id.as_str()).collect();
        let b: Vec<_> = backward.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(f, b);
    }

    #[test]
    fn thread_id_round_trips_through_the_codec() {
        let adapter = MockAdapter::new();
        for raw in ["mock:C1", "mock:C1:root42", "mock:D9"] {
            let id = ThreadId::from(raw);
            let decoded = adapter.decode_thread_id(&id).unwrap();
            assert_eq!(adapter.encode_thread_id(&decoded), id);
        }
    }

    #[test]
    fn decode_rejects_foreign_thread_ids() {
        let adapter = MockAdapter::new();
        assert!(adapter.decode_thread_id(&ThreadId::from("slack:C1")).is_err());
    }

    #[tokio::test]
    async fn remove_reaction_lists_before_deleting() {
        let adapter = MockAdapter::new();
        let message = RawMessage {
            id: "m1".into(),
            thread_id: ThreadId::from("mock:C1"),
            raw: serde_json::Value::Null,
        };

        // Not ours: one list call, zero deletes, and no error.
        adapter.remove_reaction(&message, "eyes").await.unwrap();
        {
            let calls = adapter.calls.lock();
            assert_eq!(calls.reaction_lists, 1);
            assert!(calls.reaction_deletes.is_empty());
        }

        adapter.seed_own_reaction("m1", "eyes");
        adapter.remove_reaction(&message, "eyes").await.unwrap();
        let calls = adapter.calls.lock();
        assert_eq!(calls.reaction_lists, 2);
        assert_eq!(calls.reaction_deletes, vec![("m1".to_string(), "eyes".to_string())]);
    }

    #[tokio::test]
    async fn webhook_rejects_bad_signature_and_malformed_payloads() {
        let adapter = MockAdapter::new();

        let mut unsigned = WebhookRequest::from_body(br#"{"text":"hi"}"#.to_vec());
        unsigned.headers.insert("x-signature".into(), "forged".into());
        assert_eq!(adapter.handle_webhook(unsigned).await.status, 401);

        let mut garbled = WebhookRequest::from_body(b"not json".to_vec());
        garbled.headers.insert("x-signature".into(), "valid".into());
        assert_eq!(adapter.handle_webhook(garbled).await.status, 400);

        let mut valid = WebhookRequest::from_body(
            br#"{"thread_id":"mock:C1","text":"hi","user_id":"U1","user_name":"alice"}"#.to_vec(),
        );
        valid.headers.insert("x-signature".into(), "valid".into());
        assert_eq!(adapter.handle_webhook(valid).await.status, 200);
    }
}
