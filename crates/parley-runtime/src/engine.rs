//! Engine assembly and adapter registry.
//!
//! The engine wires the pieces from `parley-core` together: one shared
//! state store, one dispatcher, one listener coordinator, and any number of
//! named adapters. Assembly is two-phase: an [`EngineBuilder`] collects
//! adapters, handlers, and listener runners while the dispatcher is still
//! mutable, then [`EngineBuilder::build`] freezes the dispatcher behind an
//! `Arc` and hands every adapter its [`AdapterContext`].
//!
//! # Example
//!
//! ```rust,ignore
//! use parley_runtime::engine::EngineBuilder;
//!
//! let mut builder = EngineBuilder::new(store, &config);
//! builder.register_adapter(Arc::new(SlackAdapter::from_config(&config)?))?;
//! builder.dispatcher().on_mention(|ctx| async move {
//!     ctx.thread.post("hello").await?;
//!     Ok(())
//! });
//! let engine = builder.build().await?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use parley_core::adapter::{AdapterContext, BoxedAdapter, WebhookRequest, WebhookResponse};
use parley_core::dispatcher::Dispatcher;
use parley_core::error::ChatResult;
use parley_core::listener::{
    BroadcastBus, ListenerBus, ListenerCoordinator, ListenerResponse, ListenerStatus,
};
use parley_core::store::StateStore;

use crate::config::ParleyConfig;
use crate::error::{RuntimeError, RuntimeResult};

type ListenerFuture = Pin<Box<dyn Future<Output = ChatResult<String>> + Send>>;
type ListenerRunner = Arc<dyn Fn(CancellationToken) -> ListenerFuture + Send + Sync>;

/// Collects adapters, handlers, and listener runners before the engine is
/// frozen.
pub struct EngineBuilder {
    store: Arc<dyn StateStore>,
    dispatcher: Dispatcher,
    bus: Arc<dyn ListenerBus>,
    adapters: HashMap<String, BoxedAdapter>,
    listeners: HashMap<String, ListenerRunner>,
    config: ParleyConfig,
}

impl EngineBuilder {
    /// Creates a builder over the given store, tuned from the config.
    pub fn new(store: Arc<dyn StateStore>, config: &ParleyConfig) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&store), config.lock.to_lock_config());
        Self {
            store,
            dispatcher,
            bus: Arc::new(BroadcastBus::new()),
            adapters: HashMap::new(),
            listeners: HashMap::new(),
            config: config.clone(),
        }
    }

    /// The dispatcher, mutable for handler registration.
    pub fn dispatcher(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    /// Replaces the in-process listener bus with a networked one.
    pub fn listener_bus(&mut self, bus: Arc<dyn ListenerBus>) -> &mut Self {
        self.bus = bus;
        self
    }

    /// Registers an adapter under its own name.
    pub fn register_adapter(&mut self, adapter: BoxedAdapter) -> RuntimeResult<()> {
        let name = adapter.name().to_string();
        if self.adapters.contains_key(&name) {
            return Err(RuntimeError::AdapterExists(name));
        }
        debug!(adapter = %name, "Registered adapter");
        self.adapters.insert(name, adapter);
        Ok(())
    }

    /// Registers a named listener runner.
    ///
    /// The runner opens the platform's long-lived connection and must
    /// observe the cancellation token at its I/O suspension points. It is
    /// invoked through `POST /listeners/{name}`.
    pub fn register_listener<F, Fut>(&mut self, name: impl Into<String>, run: F)
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ChatResult<String>> + Send + 'static,
    {
        let name = name.into();
        debug!(listener = %name, "Registered listener");
        self.listeners
            .insert(name, Arc::new(move |cancel| Box::pin(run(cancel))));
    }

    /// Freezes the dispatcher and initializes every adapter.
    pub async fn build(self) -> RuntimeResult<Engine> {
        let dispatcher = Arc::new(self.dispatcher);
        let coordinator = Arc::new(ListenerCoordinator::new(
            self.bus,
            self.config.listener.to_listener_config(),
        ));

        for (name, adapter) in &self.adapters {
            let ctx = AdapterContext::new(Arc::clone(&dispatcher), Arc::clone(adapter));
            adapter.initialize(ctx).await?;
            info!(adapter = %name, "Adapter initialized");
        }

        Ok(Engine {
            store: self.store,
            dispatcher,
            coordinator,
            adapters: self.adapters,
            listeners: self.listeners,
        })
    }
}

/// The assembled engine.
///
/// Cheap to share: the HTTP front end holds it in an `Arc` and calls
/// [`Engine::handle_webhook`] and [`Engine::invoke_listener`] concurrently.
pub struct Engine {
    store: Arc<dyn StateStore>,
    dispatcher: Arc<Dispatcher>,
    coordinator: Arc<ListenerCoordinator>,
    adapters: HashMap<String, BoxedAdapter>,
    listeners: HashMap<String, ListenerRunner>,
}

impl Engine {
    /// The shared state store.
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// The frozen dispatcher.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Looks up an adapter by name.
    pub fn adapter(&self, name: &str) -> RuntimeResult<&BoxedAdapter> {
        self.adapters
            .get(name)
            .ok_or_else(|| RuntimeError::AdapterNotFound(name.to_string()))
    }

    /// Registered adapter names.
    pub fn adapter_names(&self) -> Vec<&str> {
        self.adapters.keys().map(String::as_str).collect()
    }

    /// Routes a webhook to the named adapter.
    pub async fn handle_webhook(
        &self,
        adapter_name: &str,
        request: WebhookRequest,
    ) -> RuntimeResult<WebhookResponse> {
        let adapter = self.adapter(adapter_name)?;
        Ok(adapter.handle_webhook(request).await)
    }

    /// Invokes the named listener for at most `duration`.
    pub async fn invoke_listener(
        &self,
        name: &str,
        duration: Duration,
    ) -> RuntimeResult<ListenerResponse> {
        let runner = self
            .listeners
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::ListenerNotFound(name.to_string()))?;
        Ok(self
            .coordinator
            .invoke(name, duration, move |cancel| runner(cancel))
            .await)
    }

    /// Status for the named listener.
    pub fn listener_status(&self, name: &str) -> RuntimeResult<ListenerStatus> {
        if !self.listeners.contains_key(name) {
            return Err(RuntimeError::ListenerNotFound(name.to_string()));
        }
        Ok(self.coordinator.status(name))
    }

    /// Cancels every live listener connection. Called at shutdown.
    pub fn shutdown(&self) {
        self.coordinator.shutdown();
    }
}
