//! Unified error types for the Parley core engine.
//!
//! All engine and adapter operations resolve to [`ChatError`]. Outbound
//! operations (posting, editing, opening modals) propagate these to the
//! caller; inbound webhook processing catches them, logs, and still returns
//! a platform acknowledgement (see the dispatcher module).

use std::time::Duration;

use thiserror::Error;

/// Errors produced by the engine and by adapter operations.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Bad input or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Credentials were rejected by the platform.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Authenticated but not allowed to perform the operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The referenced message, thread, or channel does not exist.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// The platform rate-limited an outbound call.
    #[error("platform rate limit (retry after {retry_after:?})")]
    AdapterRateLimit {
        /// How long the platform asked us to wait, if it said.
        retry_after: Option<Duration>,
    },

    /// Transport or payload failure talking to a platform.
    #[error("network error: {0}")]
    Network(String),

    /// A state-store lock operation failed (store unreachable, lease lost).
    #[error("lock operation failed: {0}")]
    Lock(String),

    /// The adapter does not support the requested capability.
    #[error("adapter '{adapter}' does not support {capability}")]
    NotImplemented {
        /// Name of the adapter missing the capability.
        adapter: String,
        /// The capability that was requested.
        capability: &'static str,
    },

    /// Engine-level rate limit.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// Generic engine error with a stable code.
    #[error("{code}: {message}")]
    Chat {
        /// Stable machine-readable code.
        code: String,
        /// Human-readable description.
        message: String,
        /// Underlying cause, if any.
        #[source]
        cause: Option<Box<ChatError>>,
    },

    /// State-store failure outside the lock primitive.
    #[error("store error: {0}")]
    Store(String),
}

impl ChatError {
    /// Builds a coded engine error without a cause.
    pub fn chat(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Chat {
            code: code.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Builds a coded engine error wrapping a cause.
    pub fn chat_with_cause(
        code: impl Into<String>,
        message: impl Into<String>,
        cause: ChatError,
    ) -> Self {
        Self::Chat {
            code: code.into(),
            message: message.into(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Whether this error came from the lock subsystem.
    pub fn is_lock(&self) -> bool {
        matches!(self, Self::Lock(_))
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store(format!("serialization: {err}"))
    }
}

/// Result type for engine and adapter operations.
pub type ChatResult<T> = Result<T, ChatError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coded_error_displays_code_and_message() {
        let err = ChatError::chat("dispatch_failed", "no adapter registered");
        assert_eq!(err.to_string(), "dispatch_failed: no adapter registered");
    }

    #[test]
    fn cause_is_preserved_as_source() {
        use std::error::Error;

        let err = ChatError::chat_with_cause(
            "modal_open_failed",
            "could not open view",
            ChatError::Network("connection reset".into()),
        );
        let source = err.source().expect("cause should be the source");
        assert_eq!(source.to_string(), "network error: connection reset");
    }
}
