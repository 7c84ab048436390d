//! HTTP surface: `POST /api/v1/pdf/generate` and `GET /health`.
//!
//! The handler is a thin shell over [`Pipeline::generate`]: decode JSON,
//! run the pipeline, map the outcome to a status code. Error bodies are
//! JSON `{"error": <kind>, "detail": <message>}`; the 500 detail is fixed
//! so engine internals never reach the client.

use crate::convert::Pipeline;
use crate::error::PipelineError;
use crate::request::RenderRequest;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Route of the generate endpoint.
pub const GENERATE_PATH: &str = "/api/v1/pdf/generate";

/// Request bodies above this are refused before JSON decoding. Larger than
/// the `html` limit so oversized HTML still gets the precise 413 detail.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Error response body
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    detail: String,
}

/// An error on its way to becoming an HTTP response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    detail: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let (status, kind, detail) = match &e {
            PipelineError::InvalidRequest => (
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "Either 'html' or 'url' must be provided".to_string(),
            ),
            PipelineError::PayloadTooLarge { .. } => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                "HTML payload too large".to_string(),
            ),
            PipelineError::InvalidUrl { .. } => {
                (StatusCode::BAD_REQUEST, "invalid_url", e.to_string())
            }
            _ => {
                error!("PDF generation failed: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "render_failed",
                    "Internal error while generating PDF".to_string(),
                )
            }
        };
        Self {
            status,
            kind,
            detail,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = rejection.status();
        warn!("Rejected request body: {}", rejection.body_text());
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Self {
                status,
                kind: "payload_too_large",
                detail: "HTML payload too large".to_string(),
            };
        }
        Self {
            status,
            kind: "invalid_body",
            detail: rejection.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.kind,
            detail: self.detail,
        };
        (self.status, Json(body)).into_response()
    }
}

async fn generate_pdf(
    State(pipeline): State<Arc<Pipeline>>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let output = pipeline.generate(request).await?;

    let disposition = format!(
        "attachment; filename={}",
        pipeline.config().download_filename
    );
    let disposition = HeaderValue::from_str(&disposition).map_err(|e| {
        ApiError::from(PipelineError::Internal(format!("Content-Disposition: {e}")))
    })?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        output.pdf,
    )
        .into_response())
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        service: "folio-render",
    })
}

/// The service router.
pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route(GENERATE_PATH, post(generate_pdf))
        .route("/health", get(health_check))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(pipeline)
}

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(pipeline: Arc<Pipeline>, addr: SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Could not listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_keep_their_status() {
        assert_eq!(
            ApiError::from(PipelineError::InvalidRequest).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(PipelineError::PayloadTooLarge { size: 10, limit: 5 }).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::from(PipelineError::InvalidUrl {
                url: "ftp://x".into(),
                reason: "scheme".into()
            })
            .status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn everything_else_is_a_generic_500() {
        let e = ApiError::from(PipelineError::DeadlineExceeded { secs: 120 });
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(e.detail, "Internal error while generating PDF");
    }
}
