//! Core error taxonomy.
//!
//! `OrchestratorError` is the single error type repositories and controllers
//! share. Controllers translate it to an HTTP response in one place; workers
//! inspect the variant to decide whether a job should retry (see
//! `kernel::jobs::job::ErrorKind`).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Row does not exist, is soft-deleted, or is owned by a different user.
    /// `NotOwned` is folded into this variant at the repository boundary so
    /// callers cannot distinguish "missing" from "someone else's" (§4.2).
    #[error("not found")]
    NotFound,

    #[error("invalid input: {field}")]
    InvalidInput { field: &'static str },

    /// Entity referenced by a match-create request is not in `ready` state.
    #[error("precondition failed: {code}")]
    PreconditionFailed { code: &'static str },

    /// Like `NotFound`, but the HTTP boundary needs a specific error code
    /// (e.g. `resume_not_found`) rather than the generic `not_found` (§6.1).
    #[error("not found: {code}")]
    NamedNotFound { code: &'static str },

    #[error("quota exceeded")]
    QuotaExceeded,

    /// Missing or invalid bearer token (§6.1 "Authentication").
    #[error("unauthorized")]
    Unauthorized,

    /// Uploaded file exceeds the 10 MiB limit of §6.1.
    #[error("payload too large")]
    PayloadTooLarge,

    /// MIME type outside the `pdf`/`doc`/`docx`/`text/plain` allow-list.
    #[error("unsupported media type")]
    UnsupportedMediaType,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Object storage or NLP collaborator failure surfaced at the boundary
    /// (§7 `TransientStorage`/`NLPFailure`, only reachable here for the
    /// synchronous parts of ingestion — e.g. the initial upload).
    #[error("upstream error: {0}")]
    Upstream(#[from] anyhow::Error),
}

impl OrchestratorError {
    fn status_and_code(&self) -> (StatusCode, String, Option<&'static str>) {
        match self {
            OrchestratorError::NotFound => (StatusCode::NOT_FOUND, "not_found".into(), None),
            OrchestratorError::InvalidInput { field } => {
                (StatusCode::BAD_REQUEST, format!("{field}_required"), Some(*field))
            }
            OrchestratorError::PreconditionFailed { code } => {
                (StatusCode::CONFLICT, code.to_string(), None)
            }
            OrchestratorError::NamedNotFound { code } => {
                (StatusCode::NOT_FOUND, code.to_string(), None)
            }
            OrchestratorError::QuotaExceeded => {
                (StatusCode::PAYMENT_REQUIRED, "upgrade_required".into(), None)
            }
            OrchestratorError::Unauthorized => {
                (StatusCode::UNAUTHORIZED, "unauthorized".into(), None)
            }
            OrchestratorError::PayloadTooLarge => {
                (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large".into(), None)
            }
            OrchestratorError::UnsupportedMediaType => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type".into(), None)
            }
            OrchestratorError::Storage(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error".into(), None)
            }
            OrchestratorError::Upstream(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error".into(), None)
            }
        }
    }
}

impl IntoResponse for OrchestratorError {
    fn into_response(self) -> Response {
        match &self {
            OrchestratorError::Storage(e) => {
                tracing::error!(error = %e, "storage error reaching HTTP boundary");
            }
            OrchestratorError::Upstream(e) => {
                tracing::error!(error = %e, "upstream collaborator error reaching HTTP boundary");
            }
            _ => {}
        }
        let (status, code, field) = self.status_and_code();
        let mut body = json!({ "error": code });
        if let Some(field) = field {
            body["field"] = json!(field);
        }
        (status, Json(body)).into_response()
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
