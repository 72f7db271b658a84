use crate::infra::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, put};
use axum::{Extension, Json, Router};
use chrono::Utc;
use compliance_intake::auth::ApiCredentials;
use compliance_intake::error::AppError;
use compliance_intake::workflows::compliance::{
    compliance_router, ComplianceRequestService, SchemaProvider, SubmissionStore, UploadRegistry,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub(crate) struct SignedUploadParams {
    expires: i64,
    signature: String,
}

pub(crate) fn with_intake_routes<P, U, S>(
    service: Arc<ComplianceRequestService<P, U, S>>,
    credentials: Arc<ApiCredentials>,
) -> Router
where
    P: SchemaProvider + 'static,
    U: UploadRegistry + 'static,
    S: SubmissionStore + 'static,
{
    let storage = Router::new()
        .route("/storage/*object_key", put(storage_upload::<P, U, S>))
        .with_state(service.clone());

    compliance_router(service, credentials)
        .merge(storage)
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Stand-in for the object store: accepts a `PUT` against a pre-signed URL.
pub(crate) async fn storage_upload<P, U, S>(
    State(service): State<Arc<ComplianceRequestService<P, U, S>>>,
    Path(object_key): Path<String>,
    Query(params): Query<SignedUploadParams>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError>
where
    P: SchemaProvider + 'static,
    U: UploadRegistry + 'static,
    S: SubmissionStore + 'static,
{
    let size_bytes = body.len() as u64;
    let entry = service.accept_upload(
        &object_key,
        params.expires,
        &params.signature,
        size_bytes,
        Utc::now(),
    )?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "object_key": entry.reference.object_key,
            "size_bytes": size_bytes,
            "uploaded_at": entry.uploaded.map(|upload| upload.uploaded_at),
        })),
    ))
}
