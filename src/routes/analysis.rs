//! Document analysis endpoint.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use crate::app::AppState;
use crate::domain::analysis::{AnalyzeDocumentResponse, DocumentAnalysisRequest};
use crate::error::{ApiError, ApiResult};
use crate::middleware::request_id::RequestIdExt;
use crate::services::AnalysisError;

/// Analyze a business document.
///
/// POST /api/analyze-document
///
/// The body is decoded by hand so that a missing content type or an
/// undecodable payload is reported the same way as absent content. Every
/// 400 therefore carries the fixed "Document content is required" text:
///
/// - a body that is not JSON, or cannot be read at all, is a 400 rather
///   than a server error;
/// - a non-string `documentContent` (e.g. `42`) is a 400 and is never
///   stringified for the model;
/// - whitespace-only `documentContent` is a 400 (see
///   [`DocumentAnalyzer::analyze`](crate::services::DocumentAnalyzer::analyze)).
///
/// None of these reach the model backend.
pub async fn analyze_document(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<impl IntoResponse> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge("Document is too large".to_string())
        } else {
            tracing::debug!(error = %rejection, "Unreadable analysis request body");
            ApiError::from(AnalysisError::MissingInput)
        }
    })?;

    let request: DocumentAnalysisRequest = serde_json::from_slice(&body).map_err(|e| {
        tracing::debug!(error = %e, "Undecodable analysis request body");
        AnalysisError::MissingInput
    })?;

    let analysis = state
        .analyzer
        .analyze(request, headers.request_id())
        .await?;

    Ok(Json(AnalyzeDocumentResponse { analysis }))
}
