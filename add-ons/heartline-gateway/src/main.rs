//! Axum gateway for the Heartline pipeline. Config-driven via PipelineConfig.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use heartline_core::{
    ConversationStore, Intent, Orchestrator, PipelineAgents, PipelineConfig, SledCheckpointStore, TurnContext,
    DEFAULT_THREAD_ID, MAX_MESSAGE_CHARS,
};
use heartline_skills::{SnippetStore, StaticHealthData};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone)]
struct AppState {
    config: Arc<PipelineConfig>,
    orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    reply: String,
    thread_id: String,
    intent: Option<Intent>,
    follow_up_needed: bool,
    failed: bool,
}

/// JSON error body: `{"error": "..."}`.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(serde_json::json!({ "error": self.1 }))).into_response()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// POST /api/v1/chat – one conversational turn.
async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError(StatusCode::BAD_REQUEST, e.body_text()))?;
    let chars = req.message.chars().count();
    if chars > MAX_MESSAGE_CHARS {
        return Err(ApiError(
            StatusCode::BAD_REQUEST,
            format!("message is {chars} characters; the limit is {MAX_MESSAGE_CHARS}"),
        ));
    }
    let thread_id = non_empty(req.thread_id).unwrap_or_else(|| DEFAULT_THREAD_ID.to_string());
    let user_id = non_empty(req.user_id).unwrap_or_else(|| state.config.default_user_id.clone());

    let ctx = TurnContext::new(thread_id.clone(), user_id);
    let outcome = state.orchestrator.process_turn(&ctx, &req.message).await;
    tracing::info!(
        thread_id = %thread_id,
        intent = ?outcome.state.current_intent,
        failed = outcome.failed,
        "chat turn served"
    );
    Ok(Json(ChatResponse {
        reply: outcome.reply,
        thread_id,
        intent: outcome.state.current_intent,
        follow_up_needed: outcome.state.follow_up_needed,
        failed: outcome.failed,
    }))
}

/// GET /api/v1/health – app identity plus pipeline status.
async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.orchestrator.get_status();
    Json(serde_json::json!({
        "status": "ok",
        "app_name": state.config.app_name,
        "pipeline": status,
    }))
}

fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/health", get(health))
        .layer(cors)
        .with_state(state)
}

fn build_state(config: PipelineConfig) -> Result<AppState, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.storage_path)?;
    let health_data = Arc::new(StaticHealthData::from_optional_path(config.health_data_path.as_deref())?);
    let knowledge = Arc::new(SnippetStore::open_seeded(&config.knowledge_path())?);
    let store: Arc<dyn ConversationStore> = Arc::new(SledCheckpointStore::open_path(config.checkpoint_path())?);

    let agents = PipelineAgents::new(&config, health_data, knowledge);
    let orchestrator = Arc::new(Orchestrator::new(&config, agents, store));
    Ok(AppState {
        config: Arc::new(config),
        orchestrator,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[heartline-gateway] .env not loaded: {} (using system environment)", e);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = PipelineConfig::load()?;
    let port = config.port;
    let app_name = config.app_name.clone();
    let state = build_state(config)?;
    let app = build_app(state);

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("{} listening on {}", app_name, addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}
