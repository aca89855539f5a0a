//! HTTP surface for the recap and grading collaborator.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::backend::{GenerateRequest, GenerateResponse, GradeRequest, GradeResponse, StudyBackend};
use crate::error::BackendError;

pub type SharedBackend = Arc<dyn StudyBackend>;

/// Error body returned when the upstream model call fails.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<BackendError> for ApiError {
    fn from(err: BackendError) -> Self {
        let status = match err {
            BackendError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "message": self.message,
            "status": self.status.as_u16()
        });
        (self.status, Json(body)).into_response()
    }
}

pub fn router(backend: SharedBackend) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/generate", post(generate))
        .route("/grade", post(grade))
        .layer(TraceLayer::new_for_http())
        .with_state(backend)
}

async fn health() -> &'static str {
    "ok"
}

async fn generate(
    State(backend): State<SharedBackend>,
    Json(req): Json<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    tracing::info!(chars = req.text.len(), "generate requested");
    let response = backend.generate(&req.text).await.map_err(|e| {
        tracing::error!("generation failed: {}", e);
        ApiError::from(e)
    })?;
    Ok(Json(response))
}

async fn grade(
    State(backend): State<SharedBackend>,
    Json(req): Json<GradeRequest>,
) -> Result<Json<GradeResponse>, ApiError> {
    tracing::info!(answers = req.questions.len(), "grading requested");
    let response = backend.grade(&req).await.map_err(|e| {
        tracing::error!("grading failed: {}", e);
        ApiError::from(e)
    })?;
    Ok(Json(response))
}

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(addr: SocketAddr, backend: SharedBackend) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, router(backend)).await
}
