//! Canonical event types.
//!
//! Adapters construct one of these for every inbound webhook they accept and
//! hand it to the dispatcher. The [`ChatEvent`] enum unifies them so the
//! dispatcher can route on [`EventKind`] without downcasting.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::message::{Author, Message, ThreadId};

/// High-level classification of canonical events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A new or edited message in a thread.
    Message,
    /// A button click or other interactive-component action.
    Action,
    /// An emoji reaction added to a message.
    Reaction,
    /// A slash command invocation.
    SlashCommand,
    /// A modal form submission.
    ModalSubmit,
    /// A modal dismissed without submitting.
    ModalClose,
}

/// A new message arrived in a thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEvent {
    /// The fully parsed message.
    pub message: Message,
}

/// A button click or interactive-component action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionEvent {
    /// The component's action id (what handlers filter on).
    pub action_id: String,
    /// The selected/submitted value, if any.
    pub value: Option<String>,
    /// The message carrying the component.
    pub message_id: String,
    /// Who clicked.
    pub author: Author,
    /// The thread the carrying message lives in.
    pub thread_id: ThreadId,
    /// One-shot token for opening a modal from this interaction, if the
    /// platform supplies one.
    pub trigger_id: Option<String>,
}

/// An emoji reaction was added or removed on a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionEvent {
    /// Normalized emoji name (what handlers filter on).
    pub name: String,
    /// The message that was reacted to.
    pub message_id: String,
    /// Who reacted.
    pub author: Author,
    /// The thread the message lives in.
    pub thread_id: ThreadId,
}

/// A slash command invocation.
///
/// Slash commands have a channel but no thread; the dispatcher routes them
/// without taking a thread lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlashCommandEvent {
    /// The command name, without the leading slash.
    pub command: String,
    /// Everything after the command name.
    pub text: String,
    /// The channel the command was issued in.
    pub channel_id: String,
    /// One-shot token for opening a modal in response.
    pub trigger_id: Option<String>,
    /// Who issued the command.
    pub author: Author,
}

/// A modal form was submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalSubmitEvent {
    /// The platform's view id, when it propagates one.
    pub view_id: Option<String>,
    /// The callback id the modal was opened with (what handlers filter on).
    pub callback_id: String,
    /// Field values keyed by block/input id.
    pub values: HashMap<String, String>,
    /// Opaque state echoed back by the platform, used as a fallback when no
    /// view id is propagated.
    pub private_metadata: Option<String>,
    /// Who submitted.
    pub author: Author,
    /// One-shot token for pushing a follow-up view.
    pub trigger_id: Option<String>,
}

/// A modal was closed without submitting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModalCloseEvent {
    /// The platform's view id, when it propagates one.
    pub view_id: Option<String>,
    /// The callback id the modal was opened with.
    pub callback_id: String,
    /// Who closed it.
    pub author: Author,
}

/// The unified canonical event passed to the dispatcher.
#[derive(Debug, Clone)]
pub enum ChatEvent {
    /// A message event.
    Message(MessageEvent),
    /// An action event.
    Action(ActionEvent),
    /// A reaction event.
    Reaction(ReactionEvent),
    /// A slash command event.
    SlashCommand(SlashCommandEvent),
    /// A modal submission.
    ModalSubmit(ModalSubmitEvent),
    /// A modal close.
    ModalClose(ModalCloseEvent),
}

impl ChatEvent {
    /// Returns the event's classification.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Message(_) => EventKind::Message,
            Self::Action(_) => EventKind::Action,
            Self::Reaction(_) => EventKind::Reaction,
            Self::SlashCommand(_) => EventKind::SlashCommand,
            Self::ModalSubmit(_) => EventKind::ModalSubmit,
            Self::ModalClose(_) => EventKind::ModalClose,
        }
    }

    /// Returns the event's author.
    pub fn author(&self) -> &Author {
        match self {
            Self::Message(e) => &e.message.author,
            Self::Action(e) => &e.author,
            Self::Reaction(e) => &e.author,
            Self::SlashCommand(e) => &e.author,
            Self::ModalSubmit(e) => &e.author,
            Self::ModalClose(e) => &e.author,
        }
    }

    /// The thread this event belongs to, if it has one.
    ///
    /// Slash commands and modal events carry no thread of their own; the
    /// dispatcher routes those without taking a thread lock.
    pub fn thread_id(&self) -> Option<&ThreadId> {
        match self {
            Self::Message(e) => Some(&e.message.thread_id),
            Self::Action(e) => Some(&e.thread_id),
            Self::Reaction(e) => Some(&e.thread_id),
            Self::SlashCommand(_) | Self::ModalSubmit(_) | Self::ModalClose(_) => None,
        }
    }

    /// The id handlers filter on (action id, reaction name, command name,
    /// modal callback id). `None` for message events.
    pub fn filter_id(&self) -> Option<&str> {
        match self {
            Self::Message(_) => None,
            Self::Action(e) => Some(&e.action_id),
            Self::Reaction(e) => Some(&e.name),
            Self::SlashCommand(e) => Some(&e.command),
            Self::ModalSubmit(e) => Some(&e.callback_id),
            Self::ModalClose(e) => Some(&e.callback_id),
        }
    }
}
