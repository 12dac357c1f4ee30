//! Persistent listener coordinator.
//!
//! Some platforms need a long-lived connection (a push/gateway socket) inside
//! a request-response execution model with per-invocation time limits. The
//! coordinator keeps one connection per listener *name* alive across
//! invocations on the same warm process, and hands ownership between
//! invocations without reconnecting:
//!
//! - **Cold start**: no registry entry; the invocation opens the connection,
//!   announces itself on the shared bus (any other process holding the name
//!   aborts — the upstream protocol allows one live connection per
//!   credential), and races {work done, handoff signal, timeout}.
//! - **Warm start**: an entry exists; the new invocation resolves the
//!   previous invocation's handoff signal (its response returns
//!   `handedOff: true`, freeing the platform's execution slot), installs a
//!   fresh handoff slot, re-arms the lifetime cap from its own duration, and
//!   returns `adopted: true` immediately. The connection itself is never
//!   reopened.
//! - **Teardown**: on abort, timeout, or completion the cancellation token
//!   fires and the last invocation for the name removes the entry.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tokio::time::{Instant, sleep, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ChatResult;

/// Extra wait beyond the requested duration before the bus watcher gives up,
/// avoiding a race between the invocation's own timeout and an abort signal.
const BUS_GRACE: Duration = Duration::from_secs(5);

/// Tuning for the coordinator.
#[derive(Debug, Clone)]
pub struct ListenerConfig {
    /// Hard cap on a single invocation's connection lifetime; requested
    /// durations are clamped to this.
    pub max_duration: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(540),
        }
    }
}

/// A claim to a listener name, published when a process takes ownership.
#[derive(Debug, Clone)]
pub struct ListenerClaim {
    /// The listener name being claimed.
    pub name: String,
    /// The claiming invocation's listener id.
    pub listener_id: String,
}

/// Cross-process pub/sub channel for listener claims.
///
/// The in-process [`BroadcastBus`] suffices for a single process; multi-
/// process deployments plug in a networked implementation.
#[async_trait]
pub trait ListenerBus: Send + Sync {
    /// Announces a claim to all subscribers.
    async fn publish(&self, claim: ListenerClaim) -> ChatResult<()>;

    /// Subscribes to future claims.
    fn subscribe(&self) -> broadcast::Receiver<ListenerClaim>;
}

/// In-process [`ListenerBus`] over a tokio broadcast channel.
pub struct BroadcastBus {
    tx: broadcast::Sender<ListenerClaim>,
}

impl BroadcastBus {
    /// Creates a bus with a small claim buffer.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ListenerBus for BroadcastBus {
    async fn publish(&self, claim: ListenerClaim) -> ChatResult<()> {
        // No subscribers is fine; there is simply no one to abort.
        let _ = self.tx.send(claim);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ListenerClaim> {
        self.tx.subscribe()
    }
}

/// JSON response returned to the invoking HTTP request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerResponse {
    /// Whether the invocation ended normally.
    pub ok: bool,
    /// The id of the invocation that owns (or owned) the connection.
    pub listener_id: String,
    /// Set when a warm invocation adopted an existing connection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adopted: Option<bool>,
    /// Set when this invocation's slot was handed to a newer one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handed_off: Option<bool>,
    /// Human-readable outcome.
    pub message: String,
}

/// Health/status JSON for a listener name.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerStatus {
    /// Whether a connection is registered for the name.
    pub registered: bool,
    /// The owning listener id, when registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listener_id: Option<String>,
    /// Milliseconds since the connection was opened, when registered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_ms: Option<u64>,
}

struct ListenerEntry {
    listener_id: String,
    cancel: CancellationToken,
    handoff: Option<oneshot::Sender<()>>,
    started_at: Instant,
    /// When the most recent invocation's lifetime cap elapses. Every
    /// invocation, cold or warm, re-arms this.
    deadline: Instant,
}

/// Process-local registry of long-lived listener connections.
///
/// Lifecycle-scoped: created at startup, empty at process start, never
/// persisted.
pub struct ListenerCoordinator {
    entries: Mutex<HashMap<String, ListenerEntry>>,
    bus: Arc<dyn ListenerBus>,
    config: ListenerConfig,
}

impl ListenerCoordinator {
    /// Creates a coordinator over the given bus.
    pub fn new(bus: Arc<dyn ListenerBus>, config: ListenerConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            bus,
            config,
        }
    }

    /// Invokes the listener `name` for at most `requested` (clamped to the
    /// configured maximum).
    ///
    /// `run` receives a cancellation token and must observe it at its I/O
    /// suspension points; cancellation is cooperative, the connection is
    /// never forcibly killed.
    pub async fn invoke<F, Fut>(
        self: &Arc<Self>,
        name: &str,
        requested: Duration,
        run: F,
    ) -> ListenerResponse
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ChatResult<String>> + Send + 'static,
    {
        let duration = requested.min(self.config.max_duration);

        // Warm start: adopt the live connection and free the previous
        // invocation's execution slot.
        if let Some(response) = self.try_adopt(name, duration) {
            return response;
        }

        // Cold start.
        let listener_id = Uuid::new_v4().to_string();
        let cancel = CancellationToken::new();
        let deadline = Instant::now() + duration;
        let (handoff_tx, handoff_rx) = oneshot::channel::<()>();
        self.entries.lock().insert(
            name.to_string(),
            ListenerEntry {
                listener_id: listener_id.clone(),
                cancel: cancel.clone(),
                handoff: Some(handoff_tx),
                started_at: Instant::now(),
                deadline,
            },
        );
        info!(name = %name, listener_id = %listener_id, duration_ms = duration.as_millis() as u64, "Listener cold start");

        if let Err(e) = self
            .bus
            .publish(ListenerClaim {
                name: name.to_string(),
                listener_id: listener_id.clone(),
            })
            .await
        {
            warn!(name = %name, error = %e, "Failed to publish listener claim");
        }
        self.spawn_bus_watcher(name, &listener_id, &cancel, duration + BUS_GRACE);
        self.spawn_duration_timer(name, &listener_id, deadline);

        // The connection runs as its own task so a handoff can return this
        // invocation without dropping the connection.
        let this = Arc::clone(self);
        let task_name = name.to_string();
        let task_id = listener_id.clone();
        let task_cancel = cancel.clone();
        let mut work = tokio::spawn(async move {
            let result = run(task_cancel).await;
            this.finish(&task_name, &task_id);
            result
        });

        tokio::select! {
            result = &mut work => {
                let response = match result {
                    Ok(Ok(payload)) => ListenerResponse {
                        ok: true,
                        listener_id,
                        adopted: None,
                        handed_off: None,
                        message: payload,
                    },
                    Ok(Err(e)) => ListenerResponse {
                        ok: false,
                        listener_id,
                        adopted: None,
                        handed_off: None,
                        message: e.to_string(),
                    },
                    Err(e) => ListenerResponse {
                        ok: false,
                        listener_id,
                        adopted: None,
                        handed_off: None,
                        message: format!("listener task failed: {e}"),
                    },
                };
                self.finish(name, &response.listener_id);
                response
            }
            _ = handoff_rx => {
                debug!(name = %name, listener_id = %listener_id, "Listener handed off");
                ListenerResponse {
                    ok: true,
                    listener_id,
                    adopted: None,
                    handed_off: Some(true),
                    message: "execution slot handed to a newer invocation".into(),
                }
            }
            _ = sleep(duration) => {
                cancel.cancel();
                // Give the connection a moment to observe the cancellation.
                let _ = timeout(Duration::from_secs(1), &mut work).await;
                self.finish(name, &listener_id);
                ListenerResponse {
                    ok: true,
                    listener_id,
                    adopted: None,
                    handed_off: None,
                    message: "listener duration elapsed".into(),
                }
            }
        }
    }

    /// Health/status for a listener name.
    pub fn status(&self, name: &str) -> ListenerStatus {
        let entries = self.entries.lock();
        match entries.get(name) {
            Some(entry) => ListenerStatus {
                registered: true,
                listener_id: Some(entry.listener_id.clone()),
                uptime_ms: Some(entry.started_at.elapsed().as_millis() as u64),
            },
            None => ListenerStatus {
                registered: false,
                listener_id: None,
                uptime_ms: None,
            },
        }
    }

    /// Cancels every registered listener. Called at shutdown.
    pub fn shutdown(&self) {
        let mut entries = self.entries.lock();
        for (name, entry) in entries.drain() {
            debug!(name = %name, listener_id = %entry.listener_id, "Listener cancelled at shutdown");
            entry.cancel.cancel();
        }
    }

    fn try_adopt(self: &Arc<Self>, name: &str, duration: Duration) -> Option<ListenerResponse> {
        let deadline = Instant::now() + duration;
        let listener_id = {
            let mut entries = self.entries.lock();
            let entry = entries.get_mut(name)?;
            if let Some(previous) = entry.handoff.take() {
                // Tell the blocked invocation to return now; the connection
                // and its token stay untouched.
                let _ = previous.send(());
            }
            let (handoff_tx, _handoff_rx) = oneshot::channel::<()>();
            entry.handoff = Some(handoff_tx);
            entry.deadline = deadline;
            info!(name = %name, listener_id = %entry.listener_id, "Listener warm start, connection adopted");
            entry.listener_id.clone()
        };
        self.spawn_duration_timer(name, &listener_id, deadline);
        Some(ListenerResponse {
            ok: true,
            listener_id,
            adopted: Some(true),
            handed_off: None,
            message: "adopted existing connection".into(),
        })
    }

    /// Arms an invocation's lifetime cap. Runs detached so the cap holds
    /// even after the invocation's execution slot is handed off.
    fn spawn_duration_timer(self: &Arc<Self>, name: &str, listener_id: &str, deadline: Instant) {
        let this = Arc::clone(self);
        let name = name.to_string();
        let listener_id = listener_id.to_string();
        tokio::spawn(async move {
            sleep_until(deadline).await;
            this.expire(&name, &listener_id);
        });
    }

    /// Cancels and removes the entry once its lifetime cap has elapsed. A
    /// newer invocation may have re-armed the cap in the meantime; then this
    /// is a no-op and that invocation's timer takes over.
    fn expire(&self, name: &str, listener_id: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(name)
            && entry.listener_id == listener_id
            && Instant::now() >= entry.deadline
        {
            info!(name = %name, listener_id = %listener_id, "Listener duration elapsed, cancelling connection");
            entry.cancel.cancel();
            entries.remove(name);
        }
    }

    fn spawn_bus_watcher(
        &self,
        name: &str,
        listener_id: &str,
        cancel: &CancellationToken,
        grace: Duration,
    ) {
        let mut rx = self.bus.subscribe();
        let name = name.to_string();
        let listener_id = listener_id.to_string();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let deadline = Instant::now() + grace;
            loop {
                tokio::select! {
                    claim = rx.recv() => match claim {
                        Ok(claim) if claim.name == name && claim.listener_id != listener_id => {
                            // Another process claimed this name; only one
                            // live connection per credential is allowed.
                            info!(name = %name, other = %claim.listener_id, "Listener claim from elsewhere, aborting connection");
                            cancel.cancel();
                            return;
                        }
                        Ok(_) => {}
                        Err(_) => return,
                    },
                    _ = sleep(deadline.saturating_duration_since(Instant::now())) => return,
                    _ = cancel.cancelled() => return,
                }
            }
        });
    }

    /// Removes the entry if `listener_id` still owns it and cancels its
    /// token. Idempotent.
    fn finish(&self, name: &str, listener_id: &str) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(name)
            && entry.listener_id == listener_id
        {
            entry.cancel.cancel();
            entries.remove(name);
            debug!(name = %name, listener_id = %listener_id, "Listener entry removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> Arc<ListenerCoordinator> {
        Arc::new(ListenerCoordinator::new(
            Arc::new(BroadcastBus::new()),
            ListenerConfig {
                max_duration: Duration::from_secs(60),
            },
        ))
    }

    #[tokio::test]
    async fn cold_invocation_completes_with_payload() {
        let coordinator = coordinator();
        let response = coordinator
            .invoke("gateway", Duration::from_secs(10), |_cancel| async {
                Ok("connected, 3 events".to_string())
            })
            .await;

        assert!(response.ok);
        assert_eq!(response.message, "connected, 3 events");
        assert!(response.adopted.is_none());
        assert!(response.handed_off.is_none());
        assert!(!coordinator.status("gateway").registered);
    }

    #[tokio::test]
    async fn warm_invocation_adopts_and_hands_off() {
        let coordinator = coordinator();

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .invoke("gateway", Duration::from_secs(60), |cancel| async move {
                        cancel.cancelled().await;
                        Ok("closed".to_string())
                    })
                    .await
            })
        };

        // Let the cold start register its entry.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(coordinator.status("gateway").registered);

        let second = coordinator
            .invoke("gateway", Duration::from_secs(60), |_cancel| async {
                panic!("warm start must not reopen the connection")
            })
            .await;
        assert_eq!(second.adopted, Some(true));

        let first = first.await.unwrap();
        assert!(first.ok);
        assert_eq!(first.handed_off, Some(true));
        // The adopted connection references the first invocation's id.
        assert_eq!(second.listener_id, first.listener_id);
        // The entry survives the handoff; the connection is still live.
        assert!(coordinator.status("gateway").registered);
    }

    #[tokio::test]
    async fn warm_adoption_rearms_the_duration_cap() {
        let coordinator = coordinator();

        let first = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .invoke("gateway", Duration::from_millis(100), |cancel| async move {
                        cancel.cancelled().await;
                        Ok("closed".to_string())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(coordinator.status("gateway").registered);

        let second = coordinator
            .invoke("gateway", Duration::from_millis(20), |_cancel| async {
                panic!("warm start must not reopen the connection")
            })
            .await;
        assert_eq!(second.adopted, Some(true));

        let first = first.await.unwrap();
        assert_eq!(first.handed_off, Some(true));

        // The adopting invocation's cap now bounds the connection; it must
        // not run on past every invocation's duration.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!coordinator.status("gateway").registered);
    }

    #[tokio::test]
    async fn duration_elapsing_cancels_the_connection() {
        let coordinator = coordinator();
        let response = coordinator
            .invoke("gateway", Duration::from_millis(30), |cancel| async move {
                cancel.cancelled().await;
                Ok("observed cancel".to_string())
            })
            .await;

        assert!(response.ok);
        assert_eq!(response.message, "listener duration elapsed");
        assert!(!coordinator.status("gateway").registered);
    }

    #[tokio::test]
    async fn requested_duration_is_clamped_to_max() {
        let coordinator = Arc::new(ListenerCoordinator::new(
            Arc::new(BroadcastBus::new()),
            ListenerConfig {
                max_duration: Duration::from_millis(30),
            },
        ));
        let start = Instant::now();
        let response = coordinator
            .invoke("gateway", Duration::from_secs(600), |cancel| async move {
                cancel.cancelled().await;
                Ok("closed".to_string())
            })
            .await;
        assert!(response.ok);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn foreign_claim_aborts_the_connection() {
        let bus = Arc::new(BroadcastBus::new());
        let coordinator = Arc::new(ListenerCoordinator::new(
            Arc::clone(&bus) as Arc<dyn ListenerBus>,
            ListenerConfig {
                max_duration: Duration::from_secs(60),
            },
        ));

        let running = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .invoke("gateway", Duration::from_secs(60), |cancel| async move {
                        cancel.cancelled().await;
                        Ok("aborted".to_string())
                    })
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // A claim from another process for the same name.
        bus.publish(ListenerClaim {
            name: "gateway".into(),
            listener_id: "other-process".into(),
        })
        .await
        .unwrap();

        let response = running.await.unwrap();
        assert!(response.ok);
        assert_eq!(response.message, "aborted");
    }
}
