//! Mock adapter used across the engine's test modules.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::adapter::{
    Adapter, AdapterContext, ChannelInfo, DecodedThreadId, Direction, FetchOptions,
    ModalDefinition, ModalSupport, Page, ThreadInfo, ViewHandle, WebhookRequest, WebhookResponse,
};
use crate::error::{ChatError, ChatResult};
use crate::model::{
    Author, ChatEvent, FormattedText, Message, MessageEvent, MessageMetadata, RawMessage, ThreadId,
};

pub const BOT_USER_ID: &str = "B0";
pub const BOT_USER_NAME: &str = "bot";

/// Everything the mock records about outbound calls.
#[derive(Debug, Default)]
pub struct CallLog {
    pub posted: Vec<(ThreadId, String)>,
    pub edited: Vec<(String, String)>,
    pub deleted: Vec<String>,
    pub reactions_added: Vec<(String, String)>,
    pub reaction_deletes: Vec<(String, String)>,
    pub reaction_lists: usize,
    pub typing: usize,
    pub modals_opened: Vec<(String, String)>,
    pub modals_updated: Vec<String>,
    /// `(view_id, sorted field names)` per rejected submission.
    pub modal_errors: Vec<(String, Vec<String>)>,
}

/// In-memory [`Adapter`] with scripted messages and full call recording.
pub struct MockAdapter {
    pub calls: Mutex<CallLog>,
    /// Chronological messages per thread id.
    messages: Mutex<HashMap<String, Vec<Message>>>,
    /// The bot's own reactions, `(message_id, emoji)`.
    own_reactions: Mutex<Vec<(String, String)>>,
    seq: AtomicU64,
    ctx: Mutex<Option<AdapterContext>>,
}

impl MockAdapter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(CallLog::default()),
            messages: Mutex::new(HashMap::new()),
            own_reactions: Mutex::new(Vec::new()),
            seq: AtomicU64::new(1),
            ctx: Mutex::new(None),
        })
    }

    pub fn next_id(&self) -> String {
        format!("m{}", self.seq.fetch_add(1, Ordering::SeqCst))
    }

    /// Seeds a message directly into the mock's backing store.
    pub fn seed_message(&self, thread_id: &ThreadId, text: &str, date_sent: i64) {
        let msg = Message {
            id: self.next_id(),
            thread_id: thread_id.clone(),
            text: text.to_string(),
            formatted: FormattedText::plain(text),
            raw: Value::Null,
            author: Author::user("U1", "alice"),
            metadata: MessageMetadata::sent_at(date_sent),
            attachments: Vec::new(),
            is_mention: false,
        };
        self.messages
            .lock()
            .entry(thread_id.as_str().to_string())
            .or_default()
            .push(msg);
    }

    /// Gives the bot a pre-existing reaction on a message.
    pub fn seed_own_reaction(&self, message_id: &str, emoji: &str) {
        self.own_reactions
            .lock()
            .push((message_id.to_string(), emoji.to_string()));
    }

    /// Builds an inbound message event the way the adapter's webhook parsing
    /// would, including the one-time mention computation.
    pub fn inbound_message(&self, thread_id: &ThreadId, text: &str, author: Author) -> ChatEvent {
        let is_mention = self.is_dm(thread_id)
            || text
                .split_whitespace()
                .any(|tok| tok.trim_end_matches(|c: char| c.is_ascii_punctuation() && c != '@')
                    == format!("@{BOT_USER_NAME}"));
        ChatEvent::Message(MessageEvent {
            message: Message {
                id: self.next_id(),
                thread_id: thread_id.clone(),
                text: text.to_string(),
                formatted: FormattedText::plain(text),
                raw: Value::Null,
                author,
                metadata: MessageMetadata::sent_at(0),
                attachments: Vec::new(),
                is_mention,
            },
        })
    }
}

fn paginate(items: &[Message], options: &FetchOptions) -> Page<Message> {
    let limit = options.limit.unwrap_or(100).max(1);
    let len = items.len();
    match options.direction {
        Direction::Forward => {
            let start = options
                .cursor
                .as_deref()
                .and_then(|c| c.parse::<usize>().ok())
                .unwrap_or(0)
                .min(len);
            let end = (start + limit).min(len);
            Page {
                items: items[start..end].to_vec(),
                next_cursor: (end < len).then(|| end.to_string()),
            }
        }
        Direction::Backward => {
            let end = options
                .cursor
                .as_deref()
                .and_then(|c| c.parse::<usize>().ok())
                .unwrap_or(len)
                .min(len);
            let start = end.saturating_sub(limit);
            Page {
                items: items[start..end].to_vec(),
                next_cursor: (start > 0).then(|| start.to_string()),
            }
        }
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    async fn initialize(&self, ctx: AdapterContext) -> ChatResult<()> {
        *self.ctx.lock() = Some(ctx);
        Ok(())
    }

    async fn handle_webhook(&self, request: WebhookRequest) -> WebhookResponse {
        if request.headers.get("x-signature").map(String::as_str) != Some("valid") {
            return WebhookResponse::unauthorized();
        }
        let Ok(payload) = serde_json::from_slice::<Value>(&request.body) else {
            return WebhookResponse::bad_request();
        };
        let ctx = self.ctx.lock().clone();
        if let Some(ctx) = ctx {
            let thread_id = ThreadId::from(payload["thread_id"].as_str().unwrap_or("mock:C1"));
            let author = Author::user(
                payload["user_id"].as_str().unwrap_or("U1"),
                payload["user_name"].as_str().unwrap_or("alice"),
            );
            let event =
                self.inbound_message(&thread_id, payload["text"].as_str().unwrap_or(""), author);
            // Handler failures never surface to the platform.
            ctx.dispatch(event).await;
        }
        WebhookResponse::ok_json(json!({"ok": true}))
    }

    async fn post_message(&self, thread_id: &ThreadId, text: &str) -> ChatResult<RawMessage> {
        let id = self.next_id();
        self.calls
            .lock()
            .posted
            .push((thread_id.clone(), text.to_string()));
        Ok(RawMessage {
            id,
            thread_id: thread_id.clone(),
            raw: Value::Null,
        })
    }

    async fn edit_message(&self, message: &RawMessage, text: &str) -> ChatResult<RawMessage> {
        self.calls
            .lock()
            .edited
            .push((message.id.clone(), text.to_string()));
        Ok(message.clone())
    }

    async fn delete_message(&self, message: &RawMessage) -> ChatResult<()> {
        self.calls.lock().deleted.push(message.id.clone());
        Ok(())
    }

    async fn add_reaction(&self, message: &RawMessage, emoji: &str) -> ChatResult<()> {
        self.calls
            .lock()
            .reactions_added
            .push((message.id.clone(), emoji.to_string()));
        self.own_reactions
            .lock()
            .push((message.id.clone(), emoji.to_string()));
        Ok(())
    }

    async fn remove_reaction(&self, message: &RawMessage, emoji: &str) -> ChatResult<()> {
        // List first; only issue the delete when the bot actually has the
        // reaction.
        self.calls.lock().reaction_lists += 1;
        let had = {
            let mut own = self.own_reactions.lock();
            let before = own.len();
            own.retain(|(id, e)| !(id == &message.id && e == emoji));
            own.len() != before
        };
        if had {
            self.calls
                .lock()
                .reaction_deletes
                .push((message.id.clone(), emoji.to_string()));
        }
        Ok(())
    }

    async fn fetch_message(&self, thread_id: &ThreadId, message_id: &str) -> ChatResult<Message> {
        self.messages
            .lock()
            .get(thread_id.as_str())
            .and_then(|msgs| msgs.iter().find(|m| m.id == message_id))
            .cloned()
            .ok_or_else(|| ChatError::NotFound(format!("message '{message_id}'")))
    }

    async fn fetch_messages(
        &self,
        thread_id: &ThreadId,
        options: FetchOptions,
    ) -> ChatResult<Page<Message>> {
        let messages = self.messages.lock();
        let items = messages
            .get(thread_id.as_str())
            .cloned()
            .unwrap_or_default();
        Ok(paginate(&items, &options))
    }

    async fn fetch_channel_messages(
        &self,
        channel_id: &str,
        options: FetchOptions,
    ) -> ChatResult<Page<Message>> {
        self.fetch_messages(&ThreadId::from(format!("mock:{channel_id}")), options)
            .await
    }

    async fn fetch_thread(&self, thread_id: &ThreadId) -> ChatResult<ThreadInfo> {
        let decoded = self.decode_thread_id(thread_id)?;
        Ok(ThreadInfo {
            thread_id: thread_id.clone(),
            is_dm: self.is_dm(thread_id),
            channel_id: decoded.channel_id,
            title: None,
        })
    }

    async fn fetch_channel_info(&self, channel_id: &str) -> ChatResult<ChannelInfo> {
        Ok(ChannelInfo {
            channel_id: channel_id.to_string(),
            name: format!("#{channel_id}"),
            is_dm: channel_id.starts_with('D'),
        })
    }

    async fn list_threads(
        &self,
        channel_id: &str,
        _options: FetchOptions,
    ) -> ChatResult<Page<ThreadInfo>> {
        let messages = self.messages.lock();
        let prefix = format!("mock:{channel_id}");
        let items = messages
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .map(|k| ThreadInfo {
                thread_id: ThreadId::from(k.as_str()),
                channel_id: channel_id.to_string(),
                is_dm: channel_id.starts_with('D'),
                title: None,
            })
            .collect();
        Ok(Page {
            items,
            next_cursor: None,
        })
    }

    fn decode_thread_id(&self, thread_id: &ThreadId) -> ChatResult<DecodedThreadId> {
        let mut parts = thread_id.as_str().splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some("mock"), Some(channel), root) => Ok(DecodedThreadId {
                channel_id: channel.to_string(),
                root_message_id: root.map(str::to_string),
            }),
            _ => Err(ChatError::Validation(format!(
                "not a mock thread id: '{thread_id}'"
            ))),
        }
    }

    fn encode_thread_id(&self, decoded: &DecodedThreadId) -> ThreadId {
        match &decoded.root_message_id {
            Some(root) => ThreadId::from(format!("mock:{}:{root}", decoded.channel_id)),
            None => ThreadId::from(format!("mock:{}", decoded.channel_id)),
        }
    }

    fn is_dm(&self, thread_id: &ThreadId) -> bool {
        self.decode_thread_id(thread_id)
            .map(|d| d.channel_id.starts_with('D'))
            .unwrap_or(false)
    }

    fn parse_message(&self, raw: &Value) -> ChatResult<Message> {
        let thread_id = ThreadId::from(
            raw["thread_id"]
                .as_str()
                .ok_or_else(|| ChatError::Validation("missing thread_id".into()))?,
        );
        let text = raw["text"].as_str().unwrap_or("").to_string();
        let author = Author {
            user_id: raw["user_id"].as_str().unwrap_or("U1").to_string(),
            user_name: raw["user_name"].as_str().unwrap_or("alice").to_string(),
            full_name: raw["user_name"].as_str().unwrap_or("alice").to_string(),
            is_bot: false,
            is_me: raw["user_id"].as_str() == Some(BOT_USER_ID),
        };
        let is_mention = self.is_dm(&thread_id) || text.contains(&format!("@{BOT_USER_NAME}"));
        Ok(Message {
            id: raw["id"].as_str().unwrap_or("m0").to_string(),
            thread_id,
            formatted: FormattedText::plain(&text),
            text,
            raw: raw.clone(),
            author,
            metadata: MessageMetadata::sent_at(raw["ts"].as_i64().unwrap_or(0)),
            attachments: Vec::new(),
            is_mention,
        })
    }

    fn render_formatted(&self, formatted: &FormattedText) -> String {
        formatted.to_plain_text()
    }

    async fn start_typing(&self, _thread_id: &ThreadId) -> ChatResult<()> {
        self.calls.lock().typing += 1;
        Ok(())
    }

    fn modal_support(&self) -> Option<&dyn ModalSupport> {
        Some(self)
    }
}

#[async_trait]
impl ModalSupport for MockAdapter {
    async fn open_modal(
        &self,
        _trigger_id: &str,
        modal: &ModalDefinition,
        context_id: &str,
    ) -> ChatResult<ViewHandle> {
        let view_id = format!("V{}", self.seq.fetch_add(1, Ordering::SeqCst));
        self.calls
            .lock()
            .modals_opened
            .push((modal.callback_id.clone(), context_id.to_string()));
        Ok(ViewHandle { view_id })
    }

    async fn update_modal(
        &self,
        view_id: &str,
        _modal: &ModalDefinition,
    ) -> ChatResult<ViewHandle> {
        self.calls.lock().modals_updated.push(view_id.to_string());
        Ok(ViewHandle {
            view_id: view_id.to_string(),
        })
    }

    async fn post_validation_errors(
        &self,
        view_id: &str,
        errors: &HashMap<String, String>,
    ) -> ChatResult<()> {
        let mut fields: Vec<String> = errors.keys().cloned().collect();
        fields.sort();
        self.calls
            .lock()
            .modal_errors
            .push((view_id.to_string(), fields));
        Ok(())
    }
}
