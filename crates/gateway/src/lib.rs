//! HTTP gateway for Voltwise.
//!
//! Endpoints:
//!
//! - `POST   /ask`                     — Answer a question
//! - `GET    /health`                  — Liveness and cache counters
//! - `GET    /sessions/{id}/messages`  — Conversation history of a session
//! - `POST   /knowledge/documents`     — Index a document, invalidating cached bundles
//! - `DELETE /cache`                   — Invalidate every cached bundle
//! - `PUT    /telemetry`               — Push the latest system snapshot
//!
//! Built on Axum.

pub mod bootstrap;

pub use bootstrap::{Services, ServicesBuilder, build_services};

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use voltwise_agent::{AskError, AskResponse};
use voltwise_cache::CacheStats;
use voltwise_config::{AppConfig, GatewayConfig};
use voltwise_core::{
    AgentRole, ConversationMessage, FailureKind, KnowledgeDocument, QueryType, SystemSnapshot,
    ToolCallRecord,
};

/// Default page size for history read-back.
const DEFAULT_HISTORY_LIMIT: usize = 50;

pub type SharedState = Arc<Services>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState, config: &GatewayConfig) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/ask", post(ask_handler))
        .route("/health", get(health_handler))
        .route("/sessions/{id}/messages", get(session_messages_handler))
        .route("/knowledge/documents", post(ingest_document_handler))
        .route("/cache", delete(clear_cache_handler))
        .route("/telemetry", put(telemetry_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let services = Arc::new(build_services(&config).await?);
    let app = build_router(services, &config.gateway);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Cannot listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

// ── Bodies ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Body of a failed `/ask`: the failure and what was known when it happened.
#[derive(Debug, Serialize, Deserialize)]
pub struct AskErrorResponse {
    pub error: String,
    pub kind: FailureKind,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_type: Option<QueryType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_role: Option<String>,
    pub cache_hit: bool,
    pub context_tokens: usize,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallRecord>,
}

impl From<AskError> for AskErrorResponse {
    fn from(err: AskError) -> Self {
        Self {
            error: err.message,
            kind: err.kind,
            session_id: err.session_id,
            query_type: err.query_type,
            agent_role: err.agent_role.map(|r: AgentRole| r.display_name().to_string()),
            cache_hit: err.cache_hit,
            context_tokens: err.context_tokens,
            tool_calls: err.tool_calls,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub cache: CacheStats,
    /// Absent when the knowledge base cannot be counted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_chunks: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionMessagesResponse {
    pub session_id: String,
    pub messages: Vec<ConversationMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IngestResponse {
    pub doc_id: String,
    pub chunks: usize,
    pub invalidated: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateResponse {
    pub invalidated: usize,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    let body = Json(ErrorResponse {
        error: error.into(),
    });
    (status, body).into_response()
}

/// HTTP status for a failed request.
pub fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::CompletionTimeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::CompletionFailed => StatusCode::BAD_GATEWAY,
        FailureKind::CacheUnavailable
        | FailureKind::KnowledgeUnavailable
        | FailureKind::HistoryUnavailable
        | FailureKind::SystemStateUnavailable
        | FailureKind::UserContextUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn ask_handler(
    State(state): State<SharedState>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<AskResponse>, Response> {
    if payload.message.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "message must not be empty"));
    }

    state
        .pipeline
        .ask(&payload.message, payload.session_id)
        .await
        .map(Json)
        .map_err(|err| {
            let status = status_for(err.kind);
            (status, Json(AskErrorResponse::from(err))).into_response()
        })
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        cache: state.cache.stats(),
        knowledge_chunks: state.knowledge.count().await.ok(),
    })
}

async fn session_messages_handler(
    State(state): State<SharedState>,
    Path(session_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<SessionMessagesResponse>, Response> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let messages = state
        .pipeline
        .conversation()
        .recent(&session_id, limit, usize::MAX)
        .await
        .map_err(|e| {
            warn!(session_id = %session_id, error = %e, "History read failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        })?;

    Ok(Json(SessionMessagesResponse { session_id, messages }))
}

async fn ingest_document_handler(
    State(state): State<SharedState>,
    Json(document): Json<KnowledgeDocument>,
) -> Result<(StatusCode, Json<IngestResponse>), Response> {
    if document.doc_id.trim().is_empty() || document.text.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "doc_id and text must not be empty",
        ));
    }

    let doc_id = document.doc_id.clone();
    let chunks = state.knowledge.upsert(document).await.map_err(|e| {
        warn!(doc_id = %doc_id, error = %e, "Document ingestion failed");
        error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;

    // Bundles assembled before this document exist would hide it.
    let invalidated = state.cache.invalidate_all().await;
    info!(doc_id = %doc_id, chunks, invalidated, "Document indexed");

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            doc_id,
            chunks,
            invalidated,
        }),
    ))
}

async fn clear_cache_handler(State(state): State<SharedState>) -> Json<InvalidateResponse> {
    let invalidated = state.cache.invalidate_all().await;
    info!(invalidated, "Cache cleared");
    Json(InvalidateResponse { invalidated })
}

async fn telemetry_handler(
    State(state): State<SharedState>,
    Json(snapshot): Json<SystemSnapshot>,
) -> Result<StatusCode, Response> {
    let Some(live) = &state.live_state else {
        return Err(error_response(
            StatusCode::CONFLICT,
            "system state is read from a snapshot file",
        ));
    };
    live.update(snapshot).await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use tower::ServiceExt;
    use voltwise_core::error::ProviderError;
    use voltwise_core::{Message, Provider, ProviderRequest, ProviderResponse};

    /// Answers every request with the same text, or always fails.
    struct FixedProvider {
        answer: Result<String, ProviderError>,
        calls: Mutex<usize>,
    }

    impl FixedProvider {
        fn answering(text: &str) -> Arc<Self> {
            Arc::new(Self {
                answer: Ok(text.into()),
                calls: Mutex::new(0),
            })
        }

        fn failing(error: ProviderError) -> Arc<Self> {
            Arc::new(Self {
                answer: Err(error),
                calls: Mutex::new(0),
            })
        }
    }

    #[async_trait]
    impl Provider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            let text = self.answer.clone()?;
            Ok(ProviderResponse {
                message: Message::assistant(text),
                usage: None,
                model: "fixed".into(),
            })
        }
    }

    fn snapshot_json(soc: f32) -> serde_json::Value {
        serde_json::json!({
            "captured_at": "2026-06-01T12:00:00Z",
            "battery_soc_pct": soc,
            "battery_power_w": 1200.0,
            "solar_power_w": 4100.0,
            "load_power_w": 1300.0,
            "miners_online": 1,
            "miners_total": 2
        })
    }

    /// Services with a live snapshot already pushed.
    async fn services_with(provider: Arc<dyn Provider>) -> Arc<Services> {
        let config = AppConfig::default();
        let services = ServicesBuilder::new(&config).provider(provider).build().await.unwrap();
        let snapshot: SystemSnapshot = serde_json::from_value(snapshot_json(82.0)).unwrap();
        services.live_state.as_ref().unwrap().update(snapshot).await;
        Arc::new(services)
    }

    async fn app_with(provider: Arc<dyn Provider>) -> Router {
        build_router(services_with(provider).await, &GatewayConfig::default())
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap()
    }

    fn delete_cache() -> Request<Body> {
        Request::builder()
            .method("DELETE")
            .uri("/cache")
            .body(Body::empty())
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let app = app_with(FixedProvider::answering("ok")).await;

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.cache.hits, 0);
        assert_eq!(health.knowledge_chunks, Some(0));
    }

    #[tokio::test]
    async fn ask_returns_answer_and_diagnostics() {
        let app = app_with(FixedProvider::answering("Your battery is at 82%.")).await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/ask",
                serde_json::json!({"message": "What is my battery level?", "session_id": "s1"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let answer: AskResponse = body_json(response).await;
        assert_eq!(answer.response, "Your battery is at 82%.");
        assert_eq!(answer.query_type, QueryType::System);
        assert_eq!(answer.agent_role, "Solar Controller");
        assert_eq!(answer.session_id, "s1");
        assert!(!answer.cache_hit);
    }

    #[tokio::test]
    async fn ask_rejects_empty_message() {
        let provider = FixedProvider::answering("unused");
        let app = app_with(provider.clone()).await;

        let response = app
            .oneshot(json_request("POST", "/ask", serde_json::json!({"message": "   "})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(*provider.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn completion_timeout_maps_to_504() {
        let provider = FixedProvider::failing(ProviderError::Timeout("60s elapsed".into()));
        let app = app_with(provider).await;

        let response = app
            .oneshot(json_request(
                "POST",
                "/ask",
                serde_json::json!({"message": "What is my battery level?"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let body: AskErrorResponse = body_json(response).await;
        assert_eq!(body.kind, FailureKind::CompletionTimeout);
        assert_eq!(body.query_type, Some(QueryType::System));
        assert!(!body.cache_hit);
        assert!(body.context_tokens > 0);
    }

    #[tokio::test]
    async fn session_messages_after_ask() {
        let app = app_with(FixedProvider::answering("Solar is producing 4.1 kW.")).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/ask",
                serde_json::json!({"message": "How much solar power now?", "session_id": "abc"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let req = Request::builder()
            .uri("/sessions/abc/messages")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let history: SessionMessagesResponse = body_json(response).await;
        assert_eq!(history.messages.len(), 2);
        assert_eq!(history.messages[0].content, "How much solar power now?");
        assert_eq!(history.messages[1].content, "Solar is producing 4.1 kW.");
    }

    #[tokio::test]
    async fn ingesting_a_document_clears_cached_bundles() {
        let app = app_with(FixedProvider::answering("Battery at 80%.")).await;

        let ask = serde_json::json!({"message": "What is my battery level?", "session_id": "s1"});
        let response = app
            .clone()
            .oneshot(json_request("POST", "/ask", ask.clone()))
            .await
            .unwrap();
        let first: AskResponse = body_json(response).await;
        assert!(!first.cache_hit);
        let response = app
            .clone()
            .oneshot(json_request("POST", "/ask", ask.clone()))
            .await
            .unwrap();
        let second: AskResponse = body_json(response).await;
        assert!(second.cache_hit);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/knowledge/documents",
                serde_json::json!({
                    "doc_id": "lfp-temps",
                    "text": "LFP cells should be charged between 0 and 45 °C."
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let ingest: IngestResponse = body_json(response).await;
        assert_eq!(ingest.chunks, 1);
        assert_eq!(ingest.invalidated, 1);

        let third: AskResponse =
            body_json(app.oneshot(json_request("POST", "/ask", ask)).await.unwrap()).await;
        assert!(!third.cache_hit);
    }

    #[tokio::test]
    async fn bundles_wait_for_the_first_snapshot() {
        let config = AppConfig::default();
        let services = ServicesBuilder::new(&config)
            .provider(FixedProvider::answering("Battery at 64%."))
            .build()
            .await
            .unwrap();
        let app = build_router(Arc::new(services), &config.gateway);
        let ask = serde_json::json!({"message": "What is my battery level?"});

        // Without state the answer degrades and nothing is cached.
        let response = app
            .clone()
            .oneshot(json_request("POST", "/ask", ask.clone()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.clone().oneshot(delete_cache()).await.unwrap();
        let cleared: InvalidateResponse = body_json(response).await;
        assert_eq!(cleared.invalidated, 0);

        let response = app
            .clone()
            .oneshot(json_request("PUT", "/telemetry", snapshot_json(64.0)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let answer: AskResponse =
            body_json(app.clone().oneshot(json_request("POST", "/ask", ask)).await.unwrap()).await;
        assert!(answer.context_tokens > 0);
        let response = app.oneshot(delete_cache()).await.unwrap();
        let cleared: InvalidateResponse = body_json(response).await;
        assert_eq!(cleared.invalidated, 1);
    }

    #[tokio::test]
    async fn telemetry_push_rejected_with_snapshot_file() {
        let config = AppConfig {
            telemetry: voltwise_config::TelemetryConfig {
                snapshot_path: Some("/nonexistent/snapshot.json".into()),
            },
            ..AppConfig::default()
        };
        let services = ServicesBuilder::new(&config)
            .provider(FixedProvider::answering("ok"))
            .build()
            .await
            .unwrap();
        let app = build_router(Arc::new(services), &config.gateway);

        let response = app
            .oneshot(json_request("PUT", "/telemetry", snapshot_json(50.0)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn failure_kinds_map_to_statuses() {
        assert_eq!(status_for(FailureKind::CompletionTimeout), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_for(FailureKind::CompletionFailed), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(FailureKind::KnowledgeUnavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for(FailureKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
