//! # Parley
//!
//! A multi-platform chat-bot engine for Rust.
//!
//! ## Overview
//!
//! Parley separates platform plumbing from bot logic: adapters translate
//! each platform's webhooks into one canonical event model, and handlers
//! are written once against that model. The engine guarantees that handler
//! executions for the same conversation thread never overlap, even across
//! horizontally scaled processes, by leasing a per-thread lock in a shared
//! state store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────┐     ┌────────────────────────────┐
//! │ HTTP front   │────▶│ Dispatcher │────▶│ mention/subscribed/pattern │
//! │ end (axum)   │     │ (per-thread│────▶│ action/reaction/slash      │
//! │  + adapters  │     │   lock)    │────▶│ modal submit/close         │
//! └──────────────┘     └────────────┘     └────────────────────────────┘
//! ```
//!
//! - **parley-core**: canonical model, adapter contract, state store,
//!   dispatcher, modal and listener lifecycles
//! - **parley-runtime**: configuration, logging, engine assembly, HTTP
//!   front end
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use parley::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = parley::runtime::config::load_config()?;
//!     parley::runtime::logging::init_from_config(&config.logging);
//!
//!     let mut builder = EngineBuilder::new(Arc::new(MemoryStore::new()), &config);
//!     builder.dispatcher().on_mention(|ctx: MessageContext| async move {
//!         ctx.thread.subscribe().await?;
//!         ctx.thread.post("hello!").await?;
//!         Ok(())
//!     });
//!
//!     let engine = Arc::new(builder.build().await?);
//!     parley::runtime::http::serve(engine, &config.http.bind_addr()).await?;
//!     Ok(())
//! }
//! ```

pub use parley_core as core;
pub use parley_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use parley::prelude::*;
/// ```
pub mod prelude {
    // Engine assembly - main entry point
    pub use parley_runtime::{Engine, EngineBuilder, ParleyConfig};

    // Handler contexts and registration filters
    pub use parley_core::dispatcher::{
        Dispatcher, EventContext, HandlerFilter, MessageContext, ModalSubmitContext,
    };

    // Canonical model - for writing handlers
    pub use parley_core::model::{ChatEvent, Message, ThreadId};

    // Thread facade and outcomes
    pub use parley_core::modal::{ModalContext, SubmitOutcome};
    pub use parley_core::thread::Thread;

    // Errors
    pub use parley_core::error::{ChatError, ChatResult};

    // State store - for custom backends and tests
    pub use parley_core::store::{MemoryStore, StateStore, StateStoreExt};

    // Adapter contract - for implementing platform integrations
    pub use parley_core::adapter::{Adapter, AdapterContext, BoxedAdapter, ModalDefinition};
}
