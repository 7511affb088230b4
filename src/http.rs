//! HTTP front: `POST /generate-image` and `GET /health`.
//!
//! Only (de)serialization and status mapping live here; every decision is
//! made by [`GenerationService`].

use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::ServiceError;
use crate::service::{GenerationRequest, GenerationService};

/// Message returned with every successful generation.
pub const SUCCESS_MESSAGE: &str = "Image generated successfully!";

/// Seconds clients are asked to wait after a `Busy` rejection.
const BUSY_RETRY_AFTER_SECS: u64 = 5;

/// Body of a successful `POST /generate-image`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateImageResponse {
    /// Always [`SUCCESS_MESSAGE`].
    pub message: String,
    /// Path of the written image.
    pub path: String,
    /// Size of the written image.
    pub size_bytes: u64,
    /// When the image was written.
    pub generated_at: DateTime<Utc>,
}

/// Body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable error kind (e.g. `validation_error`, `busy`).
    pub error: String,
    /// Human-readable detail.
    pub message: String,
    /// Whether retrying the same request later may succeed.
    pub retryable: bool,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the server answers.
    pub status: String,
    /// Model the engine is asked for.
    pub model: String,
    /// Outstanding-request cap, if any.
    pub queue_depth_limit: Option<usize>,
}

/// A [`ServiceError`] rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl ApiError {
    /// Status code for the wrapped error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Busy { .. } => StatusCode::TOO_MANY_REQUESTS,
            ServiceError::Timeout(_) | ServiceError::Unavailable(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ServiceError::Engine(_) | ServiceError::Codec(_) | ServiceError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        let mut response = (status, Json(body)).into_response();
        if matches!(self.0, ServiceError::Busy { .. }) {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(BUSY_RETRY_AFTER_SECS));
        }
        response
    }
}

/// Build the application router around a running service.
pub fn router(service: Arc<GenerationService>) -> Router {
    Router::new()
        .route("/generate-image", post(generate_image_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

/// Serve `router(service)` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener fails.
pub async fn serve<F>(
    listener: TcpListener,
    service: Arc<GenerationService>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(service)).with_graceful_shutdown(shutdown).await
}

/// POST /generate-image
///
/// An empty body is treated as `{}` so the configured default prompt, if
/// any, applies.
async fn generate_image_handler(
    State(service): State<Arc<GenerationService>>,
    body: Bytes,
) -> Result<Json<GenerateImageResponse>, ApiError> {
    let request = parse_request(&body)?;
    debug!(has_prompt = request.prompt.is_some(), "Image generation request received");

    let result = service.submit(request).await?;

    Ok(Json(GenerateImageResponse {
        message: SUCCESS_MESSAGE.to_string(),
        path: result.output_path.display().to_string(),
        size_bytes: result.size_bytes,
        generated_at: result.generated_at,
    }))
}

/// GET /health
async fn health_handler(State(service): State<Arc<GenerationService>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: service.model().to_string(),
        queue_depth_limit: service.policy().max_queue_depth,
    })
}

fn parse_request(body: &[u8]) -> Result<GenerationRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(GenerationRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError(ServiceError::Validation(format!("malformed JSON body: {e}"))))
}
