//! HTTP surface.
//!
//! Thin handlers over [`JobService`] and [`WebhookProcessor`]; no
//! orchestration logic lives here, only extraction and status mapping.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use foldgate::classifier::SubmissionPayload;
use foldgate::job::JobId;
use foldgate::service::{JobService, ServiceError};
use foldgate::webhook::{CallbackDisposition, CallbackHeaders, WebhookError, WebhookProcessor};
use serde_json::json;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<JobService>,
    pub webhooks: Arc<WebhookProcessor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs", post(submit_job))
        .route("/jobs/:id", get(get_job))
        .route("/jobs/:id/batch", get(get_batch))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/webhooks/completion", post(completion_webhook))
        .with_state(state)
}

async fn submit_job(
    State(state): State<AppState>,
    Json(payload): Json<SubmissionPayload>,
) -> Response {
    match state.service.submit(payload).await {
        Ok(record) => (StatusCode::ACCEPTED, Json(record)).into_response(),
        Err(err) => service_error_to_response(err),
    }
}

async fn get_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.service.get_job(&JobId::new(id)).await {
        Ok(record) => Json(record).into_response(),
        Err(err) => service_error_to_response(err),
    }
}

async fn get_batch(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.service.get_batch_view(&JobId::new(id)).await {
        Ok(view) => Json(view).into_response(),
        Err(err) => service_error_to_response(err),
    }
}

async fn cancel_job(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.service.cancel(&JobId::new(id)).await {
        Ok(record) => Json(record).into_response(),
        Err(err) => service_error_to_response(err),
    }
}

async fn completion_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let callback_headers = CallbackHeaders {
        signature: header_string(&headers, "x-signature"),
        timestamp: header_string(&headers, "x-timestamp"),
    };
    match state.webhooks.process(&callback_headers, &body).await {
        Ok(CallbackDisposition::Applied) => {
            Json(json!({"disposition": "applied"})).into_response()
        }
        Ok(CallbackDisposition::Duplicate) => {
            Json(json!({"disposition": "duplicate"})).into_response()
        }
        Err(err) => webhook_error_to_response(err),
    }
}

fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn service_error_to_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Validation(e) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", e.to_string())
        }
        ServiceError::NotFound(id) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("job {id}"))
        }
        ServiceError::NotABatch(id) => json_error(
            StatusCode::CONFLICT,
            "not_a_batch",
            format!("job {id} is not a batch parent"),
        ),
        ServiceError::Store(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "store_error",
            e.to_string(),
        ),
        ServiceError::Lifecycle(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "lifecycle_error",
            e.to_string(),
        ),
    }
}

fn webhook_error_to_response(err: WebhookError) -> Response {
    match err {
        // One opaque message for every auth failure; details are logged
        // server-side only.
        WebhookError::Unauthorized(_) => json_error(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "callback authentication failed",
        ),
        WebhookError::Malformed(msg) => json_error(StatusCode::BAD_REQUEST, "malformed", msg),
        WebhookError::UnknownRef(r) => json_error(
            StatusCode::NOT_FOUND,
            "unknown_ref",
            format!("no job with external ref {r}"),
        ),
        WebhookError::Internal(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", msg)
        }
    }
}

fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
