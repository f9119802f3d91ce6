//! HTTP handlers

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use http::StatusCode;
use switchboard_core::{HttpError, InferenceRequest};
use switchboard_pipeline::{InferenceError, InferenceService};
use tokio_util::sync::CancellationToken;

/// Inference routes backed by the pipeline
pub fn inference_router(service: Arc<InferenceService>) -> Router {
    Router::new()
        .route("/v1/inference", routing::post(infer))
        .with_state(service)
}

/// Readiness route at `path`, backed by adapter health checks
pub fn readiness_router(path: &str, service: Arc<InferenceService>) -> Router {
    Router::new().route(path, routing::get(readiness)).with_state(service)
}

/// Health check handler
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Ready when the pipeline is enabled and every backend passes its check
async fn readiness(State(service): State<Arc<InferenceService>>) -> Response {
    if !service.enabled() {
        let body = serde_json::json!({ "status": "disabled", "providers": {} });
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response();
    }

    let mut ready = true;
    let mut providers = serde_json::Map::new();

    for (provider, result) in service.check_adapters().await {
        let status = match result {
            Ok(()) => "ok".to_owned(),
            Err(e) => {
                tracing::warn!(%provider, error = %e, "backend health check failed");
                ready = false;
                e.to_string()
            }
        };
        providers.insert(provider.to_string(), serde_json::Value::String(status));
    }

    let (status, label) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (status, Json(serde_json::json!({ "status": label, "providers": providers }))).into_response()
}

/// Handle `POST /v1/inference`
///
/// The pipeline runs on its own task so that a client disconnect, which
/// drops this future, cancels the backend call through the token and still
/// reports the cancellation.
async fn infer(State(service): State<Arc<InferenceService>>, Json(request): Json<InferenceRequest>) -> Response {
    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    let task = tokio::spawn(async move { service.infer(&request, &cancel).await });

    match task.await {
        Ok(Ok(response)) => Json(response).into_response(),
        Ok(Err(error)) => error_response(&error),
        Err(e) => {
            tracing::error!(error = %e, "inference task failed");
            let body = serde_json::json!({
                "error": {
                    "message": "an internal error occurred",
                    "type": "internal_error",
                    "code": serde_json::Value::Null,
                }
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
        }
    }
}

/// Convert a pipeline error to a JSON error response
fn error_response(error: &InferenceError) -> Response {
    let body = serde_json::json!({
        "error": {
            "message": error.client_message(),
            "type": error.error_type(),
            "code": error.code(),
        }
    });

    (error.status_code(), Json(body)).into_response()
}
