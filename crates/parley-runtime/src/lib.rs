//! # Parley Runtime
//!
//! Orchestration layer for the Parley bot engine: configuration loading,
//! logging setup, engine assembly, and the HTTP front end that receives
//! platform webhooks and listener invocations.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use parley_core::store::MemoryStore;
//! use parley_runtime::{config, engine::EngineBuilder, http, logging};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = config::load_config()?;
//!     logging::init_from_config(&config.logging);
//!
//!     let mut builder = EngineBuilder::new(Arc::new(MemoryStore::new()), &config);
//!     builder.register_adapter(Arc::new(SlackAdapter::from_config(&config)?))?;
//!     builder.dispatcher().on_mention(|ctx| async move {
//!         ctx.thread.subscribe().await?;
//!         ctx.thread.post("hi! I'm listening to this thread").await?;
//!         Ok(())
//!     });
//!
//!     let engine = Arc::new(builder.build().await?);
//!     http::serve(engine, &config.http.bind_addr()).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod logging;

pub use config::{ConfigLoader, ParleyConfig, load_config, load_config_from_file};
pub use engine::{Engine, EngineBuilder};
pub use error::{RuntimeError, RuntimeResult};
