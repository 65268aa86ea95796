//! HTTP chat server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/chat` | Answer a question (multipart form) |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! `POST /chat` takes `multipart/form-data` fields:
//!
//! | Field | Required | Default |
//! |-------|----------|---------|
//! | `question` | yes | |
//! | `history` | no | `""` |
//! | `use_rag` | no | `"true"` |
//! | `file` | no | image upload |
//!
//! and returns `{"answer": "...", "sources": [...], "mode": "rag|general|error"}`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question is required" } }
//! ```
//!
//! Error codes: `bad_request` (400), `payload_too_large` (413).

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::info;

use crate::assistant::Assistant;
use crate::config::Config;
use crate::models::{ChatRequest, ChatResponse};

/// Starts the chat server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let assistant = Arc::new(Assistant::from_config(config).await?);
    let app = router(assistant)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("chat server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router around a shared [`Assistant`].
pub fn router(assistant: Arc<Assistant>) -> anyhow::Result<Router> {
    let server = &assistant.config().server;
    let cors = cors_layer(&server.cors_origins)?;
    let body_limit = DefaultBodyLimit::max(server.max_upload_bytes);

    Ok(Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(body_limit)
        .layer(cors)
        .with_state(assistant))
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }
    let values = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o)
                .map_err(|_| anyhow::anyhow!("invalid CORS origin in server.cors_origins: {}", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(values)))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            AppError {
                status,
                code: "payload_too_large".to_string(),
                message: err.body_text(),
            }
        } else {
            bad_request(err.body_text())
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

async fn handle_chat(
    State(assistant): State<Arc<Assistant>>,
    mut multipart: Multipart,
) -> Result<Json<ChatResponse>, AppError> {
    let mut question: Option<String> = None;
    let mut request = ChatRequest {
        use_rag: "true".to_string(),
        ..Default::default()
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "question" => question = Some(field.text().await?),
            "history" => request.history = field.text().await?,
            "use_rag" => request.use_rag = field.text().await?,
            "file" => {
                let bytes = field.bytes().await?;
                // Browsers send an empty part when no file was chosen.
                if !bytes.is_empty() {
                    request.image = Some(bytes.to_vec());
                }
            }
            _ => {}
        }
    }

    request.question = question
        .filter(|q| !q.trim().is_empty())
        .ok_or_else(|| bad_request("question is required"))?;

    Ok(Json(assistant.ask(request).await))
}
