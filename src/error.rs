//! HTTP error mapping
//!
//! Every failure leaves the service as `{ "error": "<fixed message>" }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::AnalysisError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Analysis(AnalysisError::MissingInput) => StatusCode::BAD_REQUEST,
            Self::Analysis(AnalysisError::AnalysisFailed) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::PayloadTooLarge(msg) => msg.clone(),
            // Fixed messages; causes were logged where they happened
            Self::Analysis(e) => e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(error = %self, "API error");

        let status = self.status_code();
        let body = ErrorResponse {
            error: self.public_message(),
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
