//! Canonical message types.
//!
//! A [`Message`] is immutable once constructed: platform edits arrive as new
//! `Message` values with `metadata.edited` set, never as mutations. The
//! `is_mention` flag is computed once by the adapter at parse time and is
//! never recomputed downstream.

use serde::{Deserialize, Serialize};

/// Opaque, adapter-encoded identifier for a conversation unit.
///
/// A thread id is a pure, lossless, platform-namespaced encoding of whatever
/// the platform needs to address the conversation (room + root message, DM
/// peer, ...). It can be stored, logged, and round-tripped without a network
/// call; only the owning adapter can interpret its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThreadId(String);

impl ThreadId {
    /// Wraps an already-encoded thread id.
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Returns the encoded form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The author of a message, action, or reaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Platform-native user id.
    pub user_id: String,
    /// Short handle (the `@name` form, without the `@`).
    pub user_name: String,
    /// Display name.
    pub full_name: String,
    /// Whether the platform marks this user as a bot.
    pub is_bot: bool,
    /// Whether this author is the bot itself. Events with `is_me` set are
    /// dropped by the dispatcher before any handler runs.
    pub is_me: bool,
}

impl Author {
    /// Convenience constructor for a human author.
    pub fn user(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        let user_name = user_name.into();
        Self {
            user_id: user_id.into(),
            full_name: user_name.clone(),
            user_name,
            is_bot: false,
            is_me: false,
        }
    }
}

/// A span of rich text inside [`FormattedText`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Span {
    /// Plain text.
    Text { text: String },
    /// A user mention.
    Mention { user_id: String },
    /// A hyperlink with an optional label.
    Link { url: String, label: Option<String> },
    /// Inline code.
    Code { text: String },
    /// A fenced code block.
    CodeBlock { text: String, language: Option<String> },
}

/// Platform-agnostic rich text AST.
///
/// Adapters parse platform markup into this and render it back out via
/// `Adapter::render_formatted`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormattedText {
    /// The spans in document order.
    pub spans: Vec<Span>,
}

impl FormattedText {
    /// A single plain-text span.
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            spans: vec![Span::Text { text: text.into() }],
        }
    }

    /// Concatenates the plain-text content of all spans.
    pub fn to_plain_text(&self) -> String {
        let mut out = String::new();
        for span in &self.spans {
            match span {
                Span::Text { text } | Span::Code { text } | Span::CodeBlock { text, .. } => {
                    out.push_str(text);
                }
                Span::Mention { user_id } => {
                    out.push('@');
                    out.push_str(user_id);
                }
                Span::Link { url, label } => {
                    out.push_str(label.as_deref().unwrap_or(url));
                }
            }
        }
        out
    }

    /// Whether this text mentions the given user id.
    pub fn mentions(&self, user_id: &str) -> bool {
        self.spans
            .iter()
            .any(|s| matches!(s, Span::Mention { user_id: id } if id == user_id))
    }
}

/// A file or media attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// File name as shown on the platform.
    pub name: String,
    /// Download URL.
    pub url: String,
    /// MIME type, if the platform reports one.
    pub content_type: Option<String>,
}

/// Timestamps and edit status of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Unix millisecond timestamp of the original send.
    pub date_sent: i64,
    /// Whether the platform reports the message as edited.
    pub edited: bool,
    /// Unix millisecond timestamp of the last edit, if edited.
    pub edited_at: Option<i64>,
}

impl MessageMetadata {
    /// Metadata for an unedited message.
    pub fn sent_at(date_sent: i64) -> Self {
        Self {
            date_sent,
            edited: false,
            edited_at: None,
        }
    }
}

/// A fully parsed, canonical inbound message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Platform-native message id.
    pub id: String,
    /// The thread this message belongs to.
    pub thread_id: ThreadId,
    /// Plain-text content.
    pub text: String,
    /// Rich-text AST parsed from platform markup.
    pub formatted: FormattedText,
    /// The raw platform payload, preserved verbatim.
    pub raw: serde_json::Value,
    /// Who sent it.
    pub author: Author,
    /// Timestamps and edit status.
    pub metadata: MessageMetadata,
    /// Attachments, if any.
    pub attachments: Vec<Attachment>,
    /// Whether this message targets the bot (DM, platform mention entity, or
    /// an `@name` token for the bot's normalized username). Computed once at
    /// parse time by the adapter.
    pub is_mention: bool,
}

/// A lightweight handle to a message the engine created or operated on.
///
/// Returned by `post_message`/`edit_message`; carries just enough to address
/// the message again without a re-fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Platform-native message id.
    pub id: String,
    /// The thread the message lives in.
    pub thread_id: ThreadId,
    /// The raw platform response payload.
    pub raw: serde_json::Value,
}
