//! HTTP front end.
//!
//! Exposes the engine over three routes:
//!
//! - `POST /webhook/{adapter}` — platform webhooks, forwarded to the named
//!   adapter's `handle_webhook`
//! - `POST /listeners/{name}?duration=MILLIS` — invokes a persistent listener
//! - `GET /listeners/{name}` — listener health/status
//!
//! The webhook route is a thin shell: signature checking, parsing, and
//! dispatch all happen inside the adapter, and its [`WebhookResponse`] maps
//! directly onto the HTTP response.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, trace};

use parley_core::adapter::{WebhookRequest, WebhookResponse};

use crate::engine::Engine;
use crate::error::{RuntimeError, RuntimeResult};

/// Builds the axum router over a shared engine.
pub fn router(engine: Arc<Engine>) -> Router {
    Router::new()
        .route("/webhook/{adapter}", post(webhook_handler))
        .route(
            "/listeners/{name}",
            post(invoke_listener_handler).get(listener_status_handler),
        )
        .with_state(engine)
}

/// Binds the front end and serves until `ctrl-c`.
pub async fn serve(engine: Arc<Engine>, addr: &str) -> RuntimeResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;
    info!(addr = %actual_addr, "HTTP front end listening");

    let app = router(Arc::clone(&engine));
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await;

    engine.shutdown();
    if let Err(e) = result {
        error!(error = %e, "HTTP server error");
        return Err(RuntimeError::Io(e));
    }
    Ok(())
}

async fn webhook_handler(
    State(engine): State<Arc<Engine>>,
    Path(adapter): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    trace!(adapter = %adapter, len = body.len(), "Received webhook");

    let mut request = WebhookRequest::from_body(body.to_vec());
    request.query = query;
    for (name, value) in &headers {
        if let Ok(value) = value.to_str() {
            request
                .headers
                .insert(name.as_str().to_lowercase(), value.to_string());
        }
    }

    match engine.handle_webhook(&adapter, request).await {
        Ok(response) => webhook_response(response),
        Err(e) => error_response(e),
    }
}

#[derive(Deserialize)]
struct InvokeQuery {
    /// Requested connection lifetime in milliseconds. Clamped server-side
    /// to the configured maximum.
    duration: Option<u64>,
}

async fn invoke_listener_handler(
    State(engine): State<Arc<Engine>>,
    Path(name): Path<String>,
    Query(query): Query<InvokeQuery>,
) -> Response {
    let requested = Duration::from_millis(query.duration.unwrap_or(u64::MAX));
    match engine.invoke_listener(&name, requested).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn listener_status_handler(
    State(engine): State<Arc<Engine>>,
    Path(name): Path<String>,
) -> Response {
    match engine.listener_status(&name) {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(e) => error_response(e),
    }
}

fn webhook_response(response: WebhookResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::OK);
    match response.body {
        Some(body) => (status, Json(body)).into_response(),
        None => status.into_response(),
    }
}

fn error_response(error: RuntimeError) -> Response {
    let status = match &error {
        RuntimeError::AdapterNotFound(_) | RuntimeError::ListenerNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": error.to_string() }))).into_response()
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use parley_core::adapter::{Adapter, AdapterContext};
    use parley_core::error::{ChatError, ChatResult};
    use parley_core::model::{FormattedText, Message, RawMessage, ThreadId};
    use parley_core::store::MemoryStore;
    use tower::ServiceExt;

    use super::*;
    use crate::config::ParleyConfig;
    use crate::engine::EngineBuilder;

    struct EchoAdapter;

    #[async_trait::async_trait]
    impl Adapter for EchoAdapter {
        fn name(&self) -> &str {
            "echo"
        }

        async fn initialize(&self, _ctx: AdapterContext) -> ChatResult<()> {
            Ok(())
        }

        async fn handle_webhook(&self, request: WebhookRequest) -> WebhookResponse {
            if request.headers.get("x-signature").map(String::as_str) != Some("valid") {
                return WebhookResponse::unauthorized();
            }
            WebhookResponse::ok_json(json!({ "len": request.body.len() }))
        }

        async fn post_message(&self, _: &ThreadId, _: &str) -> ChatResult<RawMessage> {
            Err(ChatError::NotImplemented {
                adapter: "echo".into(),
                capability: "post_message",
            })
        }

        async fn edit_message(&self, _: &RawMessage, _: &str) -> ChatResult<RawMessage> {
            Err(ChatError::NotImplemented {
                adapter: "echo".into(),
                capability: "edit_message",
            })
        }

        async fn delete_message(&self, _: &RawMessage) -> ChatResult<()> {
            Ok(())
        }

        async fn add_reaction(&self, _: &RawMessage, _: &str) -> ChatResult<()> {
            Ok(())
        }

        async fn remove_reaction(&self, _: &RawMessage, _: &str) -> ChatResult<()> {
            Ok(())
        }

        async fn fetch_message(&self, _: &ThreadId, id: &str) -> ChatResult<Message> {
            Err(ChatError::NotFound(format!("message '{id}'")))
        }

        async fn fetch_messages(
            &self,
            _: &ThreadId,
            _: parley_core::adapter::FetchOptions,
        ) -> ChatResult<parley_core::adapter::Page<Message>> {
            Ok(parley_core::adapter::Page {
                items: Vec::new(),
                next_cursor: None,
            })
        }

        async fn fetch_channel_messages(
            &self,
            _: &str,
            _: parley_core::adapter::FetchOptions,
        ) -> ChatResult<parley_core::adapter::Page<Message>> {
            Ok(parley_core::adapter::Page {
                items: Vec::new(),
                next_cursor: None,
            })
        }

        async fn fetch_thread(
            &self,
            thread_id: &ThreadId,
        ) -> ChatResult<parley_core::adapter::ThreadInfo> {
            Ok(parley_core::adapter::ThreadInfo {
                thread_id: thread_id.clone(),
                channel_id: "C1".into(),
                is_dm: false,
                title: None,
            })
        }

        async fn fetch_channel_info(
            &self,
            channel_id: &str,
        ) -> ChatResult<parley_core::adapter::ChannelInfo> {
            Ok(parley_core::adapter::ChannelInfo {
                channel_id: channel_id.to_string(),
                name: channel_id.to_string(),
                is_dm: false,
            })
        }

        async fn list_threads(
            &self,
            _: &str,
            _: parley_core::adapter::FetchOptions,
        ) -> ChatResult<parley_core::adapter::Page<parley_core::adapter::ThreadInfo>> {
            Ok(parley_core::adapter::Page {
                items: Vec::new(),
                next_cursor: None,
            })
        }

        fn decode_thread_id(
            &self,
            thread_id: &ThreadId,
        ) -> ChatResult<parley_core::adapter::DecodedThreadId> {
            Ok(parley_core::adapter::DecodedThreadId {
                channel_id: thread_id.as_str().to_string(),
                root_message_id: None,
            })
        }

        fn encode_thread_id(
            &self,
            decoded: &parley_core::adapter::DecodedThreadId,
        ) -> ThreadId {
            ThreadId::from(decoded.channel_id.as_str())
        }

        fn is_dm(&self, _: &ThreadId) -> bool {
            false
        }

        fn parse_message(&self, _: &serde_json::Value) -> ChatResult<Message> {
            Err(ChatError::NotImplemented {
                adapter: "echo".into(),
                capability: "parse_message",
            })
        }

        fn render_formatted(&self, formatted: &FormattedText) -> String {
            formatted.to_plain_text()
        }
    }

    async fn test_engine() -> Arc<Engine> {
        let mut b = EngineBuilder::new(Arc::new(MemoryStore::new()), &ParleyConfig::default());
        b.register_adapter(Arc::new(EchoAdapter)).unwrap();
        b.register_listener("gateway", |_cancel| async {
            Ok("connected".to_string())
        });
        Arc::new(b.build().await.unwrap())
    }

    #[tokio::test]
    async fn webhook_route_maps_adapter_response_onto_http() {
        let app = router(test_engine().await);

        let response = app
            .clone()
            .oneshot(
                Request::post("/webhook/echo")
                    .header("X-Signature", "valid")
                    .body(Body::from("payload"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::post("/webhook/echo")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::post("/webhook/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listener_routes_invoke_and_report_status() {
        let app = router(test_engine().await);

        let response = app
            .clone()
            .oneshot(
                Request::post("/listeners/gateway?duration=5000")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(
                Request::get("/listeners/gateway")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::post("/listeners/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
