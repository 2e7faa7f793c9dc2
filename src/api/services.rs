use axum::{Json, extract::State, http::HeaderMap, response::IntoResponse};
use http_body_util::BodyExt;
use serde_json::json;
use tracing::{info, warn};

use super::models::{DownloadRequest, DownloadResponse};
use super::state::AppState;
use crate::api::error::ApiError;

/// Download submission endpoint (POST /downloads)
///
/// Validates the request up front and then runs the pipeline to its
/// terminal state before answering:
/// 1. Validate Content-Type and body size
/// 2. Deserialize and validate the request (required fields, bare file
///    name, custom_path presence)
/// 3. Run the pipeline: resolve link -> fetch -> normalize -> place
/// 4. Answer with the terminal result; pipeline failures are reported
///    in-band as `success: false` since the RPC itself completed
///
/// Progress for long-running jobs is polled separately via the session id
/// carried in the request.
pub async fn submit_download(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    super::utils::parse_content_type(content_type)?;

    let body_bytes = read_body(body, state.config.server.max_payload_bytes.as_u64() as usize)
        .await?;

    let request: DownloadRequest = serde_json::from_slice(&body_bytes)?;
    super::validation::validate_request(&request)
        .map_err(|err| ApiError::InvalidPayload(err.to_string()))?;

    info!(
        file_name = %request.file_name,
        category = ?request.category,
        session = request.session_id.as_deref().unwrap_or("-"),
        "accepted download request"
    );

    let response = match state.pipeline.run(request).await {
        Ok(outcome) => DownloadResponse::completed(outcome),
        Err(err) => {
            warn!(error = %err, "download request failed");
            DownloadResponse::failed(err.to_string())
        }
    };

    Ok((axum::http::StatusCode::OK, Json(response)))
}

/// Reads request body and validates size
///
/// Decompression is handled transparently by the RequestDecompressionLayer
/// middleware, so this receives already-decompressed data.
async fn read_body(body: axum::body::Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes()
        .to_vec();

    super::utils::validate_body_size(&data, max_size)?;

    Ok(data)
}

/// Progress polling endpoint (GET /downloads/progress/{session_id})
///
/// Read-only snapshot of one session's progress record. Unknown tokens and
/// terminal records past their retention window both answer `not_found`.
pub async fn get_progress(
    State(state): State<AppState>,
    axum::extract::Path(session_id): axum::extract::Path<String>,
) -> impl IntoResponse {
    match state.tracker.read(&session_id).await {
        Some(record) => (axum::http::StatusCode::OK, Json(json!(record))),
        None => (
            axum::http::StatusCode::OK,
            Json(json!({"status": "not_found"})),
        ),
    }
}

/// Health check endpoint (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());
    components.insert("pipeline".to_string(), "healthy".to_string());
    components.insert("progress_tracker".to_string(), "healthy".to_string());

    let snapshot = state.metrics.snapshot();
    tracing::debug!(
        started = snapshot.downloads_started,
        completed = snapshot.downloads_completed,
        failed = snapshot.downloads_failed,
        "health probed"
    );

    let response = super::models::HealthResponse {
        status: "healthy".to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (axum::http::StatusCode::OK, Json(response))
}
