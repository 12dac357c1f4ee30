//! Runtime error types.

use thiserror::Error;

/// Errors that can occur during runtime operations.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No adapter registered under the given name.
    #[error("Adapter not found: {0}")]
    AdapterNotFound(String),

    /// An adapter with the same name is already registered.
    #[error("Adapter already registered: {0}")]
    AdapterExists(String),

    /// No listener runner registered under the given name.
    #[error("Listener not found: {0}")]
    ListenerNotFound(String),

    /// Engine error bubbled up from the core.
    #[error("Engine error: {0}")]
    Core(#[from] parley_core::ChatError),

    /// Socket binding or I/O failure in the HTTP front end.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
