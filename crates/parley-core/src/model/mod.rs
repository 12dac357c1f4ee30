//! Canonical message and event model.
//!
//! These are the platform-agnostic shapes every adapter must produce and the
//! engine consumes. Adapters translate wire payloads into this model at the
//! boundary; nothing platform-specific leaks past it.

mod event;
mod message;

pub use event::{
    ActionEvent, ChatEvent, EventKind, MessageEvent, ModalCloseEvent, ModalSubmitEvent,
    ReactionEvent, SlashCommandEvent,
};
pub use message::{
    Attachment, Author, FormattedText, Message, MessageMetadata, RawMessage, Span, ThreadId,
};
