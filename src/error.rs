use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use thiserror::Error;

/// Failures surfaced by the clip pipeline.
///
/// Collaborator variants carry the adapter's error chain verbatim so the
/// text can be shown to the user through the job status.
#[derive(Debug, Error)]
pub enum ClipError {
    #[error("{0}")]
    Validation(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("File too large: {size} bytes (max {limit} bytes)")]
    PayloadTooLarge { size: u64, limit: u64 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Transcription already in progress for video {0}")]
    AlreadyInProgress(String),

    #[error("Audio extraction failed: {0}")]
    Extraction(String),

    #[error("Recognition failed: {0}")]
    Recognition(String),

    #[error("Trim failed: {0}")]
    Trim(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ClipError {
    /// Wraps an adapter error, keeping the whole context chain.
    pub fn extraction(e: anyhow::Error) -> Self {
        ClipError::Extraction(format!("{e:#}"))
    }

    pub fn recognition(e: anyhow::Error) -> Self {
        ClipError::Recognition(format!("{e:#}"))
    }

    pub fn trim(e: anyhow::Error) -> Self {
        ClipError::Trim(format!("{e:#}"))
    }

    pub fn storage(e: anyhow::Error) -> Self {
        ClipError::Storage(format!("{e:#}"))
    }
}

impl From<std::io::Error> for ClipError {
    fn from(e: std::io::Error) -> Self {
        ClipError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ClipError {
    fn from(e: serde_json::Error) -> Self {
        ClipError::Storage(e.to_string())
    }
}

impl ResponseError for ClipError {
    fn status_code(&self) -> StatusCode {
        match self {
            ClipError::Validation(_) | ClipError::InvalidRange(_) => StatusCode::BAD_REQUEST,
            ClipError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ClipError::NotFound(_) => StatusCode::NOT_FOUND,
            ClipError::AlreadyInProgress(_) => StatusCode::CONFLICT,
            ClipError::Extraction(_)
            | ClipError::Recognition(_)
            | ClipError::Trim(_)
            | ClipError::Configuration(_)
            | ClipError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "error": self.to_string()
        }))
    }
}
