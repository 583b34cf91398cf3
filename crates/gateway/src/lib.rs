//! HTTP gateway for Sidekick.
//!
//! Serves the embedded chat page, a health check and the v1 session API.
//! Every browser session owns its own conversation state; the provider,
//! tool registry and orchestrator are built once and shared.
//!
//! Built on Axum.

pub mod api;
pub mod frontend;
pub mod session;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::info;

use sidekick_agent::Orchestrator;
use sidekick_config::AppConfig;
use sidekick_core::error::{ProviderError, ToolError};

use session::SessionStore;

/// Request bodies larger than this are rejected.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: RwLock<SessionStore>,
}

impl GatewayState {
    pub fn new(orchestrator: Arc<Orchestrator>, max_sessions: usize) -> Self {
        Self {
            orchestrator,
            sessions: RwLock::new(SessionStore::new(max_sessions)),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("model provider unavailable: {0}")]
    Provider(#[from] ProviderError),

    #[error("tools unavailable: {0}")]
    Tools(#[from] ToolError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Build the full router: health, v1 API and the embedded frontend.
///
/// Layers applied:
/// - CORS (any origin, the page and API are same-origin in normal use)
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api::v1_router(state))
        .merge(frontend::frontend_router())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(CorsLayer::permissive())
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), GatewayError> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = sidekick_providers::build_from_config(&config)?;
    let tools = Arc::new(sidekick_tools::default_registry(&config.tools)?);
    info!(
        provider = provider.name(),
        tools = tools.len(),
        sandbox = %config.tools.sandbox_dir.display(),
        "Subsystems ready"
    );

    let orchestrator = Arc::new(Orchestrator::from_config(&config, provider, tools));
    let state = Arc::new(GatewayState::new(orchestrator, config.gateway.max_sessions));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| GatewayError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app).await.map_err(GatewayError::Serve)?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use sidekick_core::message::{Message, MessageToolCall, Role};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use sidekick_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use sidekick_core::tool::ToolRegistry;
    use tower::ServiceExt;

    /// Echoes the user's last message as the worker and always approves
    /// as the evaluator.
    struct EchoProvider;

    #[async_trait]
    impl Provider for EchoProvider {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let content = if request.response_format.is_some() {
                serde_json::json!({
                    "feedback": "Answer accepted",
                    "success_criteria_met": true,
                    "user_input_needed": false
                })
                .to_string()
            } else {
                let last_user = request
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User)
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                format!("Echo: {last_user}")
            };
            Ok(ProviderResponse {
                message: Message::assistant(content),
                usage: None,
                model: request.model,
            })
        }
    }

    /// Fails every call with a non-retryable error.
    struct BrokenProvider;

    #[async_trait]
    impl Provider for BrokenProvider {
        fn name(&self) -> &str {
            "broken"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::AuthenticationFailed("invalid key".into()))
        }
    }

    /// A worker that never finishes: every reply asks for another listing
    /// of a different directory.
    #[derive(Default)]
    struct BusyProvider {
        calls: AtomicUsize,
    }

    impl BusyProvider {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for BusyProvider {
        fn name(&self) -> &str {
            "busy"
        }

        async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(Duration::from_millis(10)).await;
            let mut message = Message::assistant("");
            message.tool_calls.push(MessageToolCall {
                id: format!("call_{n}"),
                name: "list_directory".into(),
                arguments: serde_json::json!({"dir_path": format!("dir{n}")}).to_string(),
            });
            Ok(ProviderResponse {
                message,
                usage: None,
                model: request.model,
            })
        }
    }

    /// Wait until the provider has been called at least `n` times.
    async fn wait_for_calls(provider: &BusyProvider, n: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while provider.calls() < n {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("run never started");
    }

    /// Assert the call count stops moving.
    async fn assert_run_stopped(provider: &BusyProvider) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let settled = provider.calls();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(provider.calls(), settled, "run kept calling the model");
        assert!(settled < 25);
    }

    fn stream_request(id: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/v1/sessions/{id}/run/stream"))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message": "find the report"}"#))
            .unwrap()
    }

    fn app_with(provider: Arc<dyn Provider>) -> Router {
        let config = AppConfig::default();
        let orchestrator = Orchestrator::from_config(&config, provider, Arc::new(ToolRegistry::new()));
        build_router(Arc::new(GatewayState::new(Arc::new(orchestrator), 8)))
    }

    fn app() -> Router {
        app_with(Arc::new(EchoProvider))
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let builder = Request::builder().method(method).uri(uri);
        let req = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    async fn new_session(app: &Router) -> String {
        let (status, json) = send(app, "POST", "/v1/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        json["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (status, json) = send(&app(), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn run_appends_transcript() {
        let app = app();
        let id = new_session(&app).await;

        let (status, json) = send(
            &app,
            "POST",
            &format!("/v1/sessions/{id}/run"),
            Some(serde_json::json!({"message": "hello", "success_criteria": "A greeting"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["reply"], "Echo: hello");
        assert_eq!(json["halt_reason"], "success_criteria_met");
        assert_eq!(json["needs_user_input"], false);

        let transcript = json["transcript"].as_array().unwrap();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[0]["role"], "user");
        assert_eq!(transcript[1]["role"], "assistant");
        assert_eq!(transcript[2]["role"], "evaluator");

        let (_, session) = send(&app, "GET", &format!("/v1/sessions/{id}"), None).await;
        assert_eq!(session["transcript"].as_array().unwrap().len(), 3);
        assert_eq!(session["success_criteria"], "A greeting");
    }

    #[tokio::test]
    async fn second_turn_continues_the_session() {
        let app = app();
        let id = new_session(&app).await;
        let uri = format!("/v1/sessions/{id}/run");

        send(&app, "POST", &uri, Some(serde_json::json!({"message": "one"}))).await;
        let (_, json) = send(&app, "POST", &uri, Some(serde_json::json!({"message": "two"}))).await;

        assert_eq!(json["reply"], "Echo: two");
        assert_eq!(json["transcript"].as_array().unwrap().len(), 6);
        let (_, session) = send(&app, "GET", &format!("/v1/sessions/{id}"), None).await;
        // user, reply, feedback per turn
        assert_eq!(session["message_count"], 6);
    }

    #[tokio::test]
    async fn reset_clears_session() {
        let app = app();
        let id = new_session(&app).await;
        send(
            &app,
            "POST",
            &format!("/v1/sessions/{id}/run"),
            Some(serde_json::json!({"message": "hello"})),
        )
        .await;

        let (status, json) = send(&app, "POST", &format!("/v1/sessions/{id}/reset"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["transcript"].as_array().unwrap().is_empty());
        assert_eq!(json["message_count"], 0);
        assert_eq!(json["session_id"], id.as_str());
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let app = app();
        for (method, uri) in [
            ("GET", "/v1/sessions/missing"),
            ("DELETE", "/v1/sessions/missing"),
            ("POST", "/v1/sessions/missing/reset"),
        ] {
            let (status, json) = send(&app, method, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
            assert!(json["error"].as_str().unwrap().contains("missing"));
        }

        let (status, _) = send(
            &app,
            "POST",
            "/v1/sessions/missing/run",
            Some(serde_json::json!({"message": "hi"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let app = app();
        let id = new_session(&app).await;
        let (status, _) = send(&app, "DELETE", &format!("/v1/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, "GET", &format!("/v1/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn empty_message_rejected() {
        let app = app();
        let id = new_session(&app).await;
        let (status, _) = send(
            &app,
            "POST",
            &format!("/v1/sessions/{id}/run"),
            Some(serde_json::json!({"message": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn provider_failure_keeps_session_unchanged() {
        let app = app_with(Arc::new(BrokenProvider));
        let id = new_session(&app).await;

        let (status, json) = send(
            &app,
            "POST",
            &format!("/v1/sessions/{id}/run"),
            Some(serde_json::json!({"message": "hello"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(json["error"].as_str().unwrap().contains("invalid key"));

        let (_, session) = send(&app, "GET", &format!("/v1/sessions/{id}"), None).await;
        assert_eq!(session["message_count"], 0);
    }

    #[tokio::test]
    async fn stream_emits_run_events() {
        let app = app();
        let id = new_session(&app).await;

        let req = Request::builder()
            .method("POST")
            .uri(format!("/v1/sessions/{id}/run/stream"))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message": "hi"}"#))
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("event: worker_reply"));
        assert!(text.contains("event: evaluation"));
        assert!(text.contains("event: halted"));

        // The body ends when the run task drops its sink, after committing
        let (_, session) = send(&app, "GET", &format!("/v1/sessions/{id}"), None).await;
        assert_eq!(session["transcript"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn closing_the_stream_cancels_the_run() {
        let provider = Arc::new(BusyProvider::default());
        let app = app_with(provider.clone());
        let id = new_session(&app).await;

        let response = app.clone().oneshot(stream_request(&id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        wait_for_calls(&provider, 2).await;
        drop(response);

        assert_run_stopped(&provider).await;
        // Cancelled runs leave the session as it was
        let (_, session) = send(&app, "GET", &format!("/v1/sessions/{id}"), None).await;
        assert_eq!(session["message_count"], 0);
    }

    #[tokio::test]
    async fn deleting_the_session_cancels_the_run() {
        let provider = Arc::new(BusyProvider::default());
        let app = app_with(provider.clone());
        let id = new_session(&app).await;

        let response = app.clone().oneshot(stream_request(&id)).await.unwrap();
        wait_for_calls(&provider, 2).await;

        let (status, _) = send(&app, "DELETE", &format!("/v1/sessions/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_run_stopped(&provider).await;

        let body = tokio::time::timeout(Duration::from_secs(2), response.into_body().collect())
            .await
            .expect("stream did not end")
            .unwrap()
            .to_bytes();
        let text = String::from_utf8_lossy(&body);
        assert!(text.contains("event: halted"));
        assert!(text.contains("cancelled"));
    }

    #[tokio::test]
    async fn reset_cancels_a_blocking_run() {
        let provider = Arc::new(BusyProvider::default());
        let app = app_with(provider.clone());
        let id = new_session(&app).await;

        let run = tokio::spawn({
            let app = app.clone();
            let uri = format!("/v1/sessions/{id}/run");
            async move { send(&app, "POST", &uri, Some(serde_json::json!({"message": "go"}))).await }
        });
        wait_for_calls(&provider, 2).await;

        let (status, _) = send(&app, "POST", &format!("/v1/sessions/{id}/reset"), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, json) = tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .expect("run did not stop")
            .unwrap();
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(json["error"].as_str().is_some());
        assert_run_stopped(&provider).await;
    }

    #[tokio::test]
    async fn lists_tools() {
        let (status, json) = send(&app(), "GET", "/v1/tools", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 0);
    }
}
