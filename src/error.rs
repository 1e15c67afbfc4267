//! the error taxonomy, one variant per row of the spec's error-handling table.
//!
//! centralised here (rather than per-module like the teacher's
//! `EmbeddingError`/`VectorSearchError`) because every route in
//! `routes.rs` needs the same kind-to-status mapping.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("search backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("embedding service failed: {0}")]
    EmbeddingFailure(String),

    #[error("summariser unavailable: {0}")]
    SummariserFailure(String),

    #[error("deadline exceeded")]
    Timeout,

    #[error("connection pool saturated")]
    Busy,

    #[error("not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    kind: &'static str,
}

impl PipelineError {
    fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidArgument(_) => "InvalidArgument",
            PipelineError::BackendUnavailable(_) => "BackendUnavailable",
            PipelineError::EmbeddingFailure(_) => "EmbeddingFailure",
            PipelineError::SummariserFailure(_) => "SummariserFailure",
            PipelineError::Timeout => "Timeout",
            PipelineError::Busy => "Busy",
            PipelineError::NotFound(_) => "NotFound",
        }
    }
}

impl ResponseError for PipelineError {
    fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            PipelineError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PipelineError::EmbeddingFailure(_) => StatusCode::BAD_GATEWAY,
            // SummariserFailure never reaches here as a hard error: the
            // orchestrator downgrades it to a 200 + null summary + warning.
            PipelineError::SummariserFailure(_) => StatusCode::OK,
            PipelineError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Busy => StatusCode::TOO_MANY_REQUESTS,
            PipelineError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            success: false,
            error: self.to_string(),
            kind: self.kind(),
        })
    }
}
