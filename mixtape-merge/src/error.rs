//! Error types for mixtape-merge
//!
//! `MergeError` is the service-wide failure taxonomy. Precondition failures
//! (`QueueFull`, `InsufficientItems`, `AlreadyInProgress`) are reported before a job
//! exists; every other variant aborts a job. `ApiError` maps both onto HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Message shown to users for any failure inside a running job
pub const JOB_FAILURE_MESSAGE: &str = "processing error, retry with smaller/fewer files";

/// Merge pipeline error
#[derive(Debug, Error)]
pub enum MergeError {
    /// Session queue already holds `capacity` items
    #[error("Queue full ({capacity} items)")]
    QueueFull { capacity: usize },

    /// Fewer than two queued items at merge time
    #[error("Need at least 2 queued items to merge, have {count}")]
    InsufficientItems { count: usize },

    /// A job already holds this owner's lock
    #[error("A merge is already in progress for owner {owner_id}")]
    AlreadyInProgress { owner_id: i64 },

    /// Referenced file or remote resource does not exist
    #[error("Source not found: {0}")]
    NotFound(String),

    /// Reference escapes the storage root or the remote refused access
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Remote fetch exceeded its deadline
    #[error("Network timeout: {0}")]
    NetworkTimeout(String),

    /// Transport error other than a timeout
    #[error("Network error: {0}")]
    Network(String),

    /// Reference cannot be interpreted
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// External transcoder exited non-zero or its output broke
    #[error("Transcode failed: {0}")]
    TranscodeFailure(String),

    /// Job exceeded the configured merge ceiling
    #[error("Merge timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Output delivery to the caller failed
    #[error("Output delivery failed: {0}")]
    Delivery(String),

    /// Local file system error while preparing private copies
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MergeError {
    /// Stable machine-readable category code
    pub fn category(&self) -> &'static str {
        match self {
            MergeError::QueueFull { .. } => "QUEUE_FULL",
            MergeError::InsufficientItems { .. } => "INSUFFICIENT_ITEMS",
            MergeError::AlreadyInProgress { .. } => "ALREADY_IN_PROGRESS",
            MergeError::NotFound(_) => "NOT_FOUND",
            MergeError::AccessDenied(_) => "ACCESS_DENIED",
            MergeError::NetworkTimeout(_) => "NETWORK_TIMEOUT",
            MergeError::Network(_) => "NETWORK_ERROR",
            MergeError::InvalidReference(_) => "INVALID_REFERENCE",
            MergeError::TranscodeFailure(_) => "TRANSCODE_FAILURE",
            MergeError::Timeout(_) => "TIMEOUT",
            MergeError::Delivery(_) => "DELIVERY_FAILED",
            MergeError::Io(_) => "IO_ERROR",
        }
    }

    /// Precondition failures never enter the job state machine
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            MergeError::QueueFull { .. }
                | MergeError::InsufficientItems { .. }
                | MergeError::AlreadyInProgress { .. }
        )
    }

    /// Text safe to show the user
    ///
    /// Job failures collapse to one message; the detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            MergeError::QueueFull { capacity } => {
                format!("queue is full ({} items), merge or clear it first", capacity)
            }
            MergeError::InsufficientItems { .. } => {
                "add at least 2 items before merging".to_string()
            }
            MergeError::AlreadyInProgress { .. } => {
                "a merge is already running, wait for it to finish".to_string()
            }
            _ => JOB_FAILURE_MESSAGE.to_string(),
        }
    }
}

/// Result alias for the merge pipeline
pub type MergeResult<T> = Result<T, MergeError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Pipeline error mapped by category
    #[error(transparent)]
    Merge(#[from] MergeError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Merge(ref err) => {
                let status = match err {
                    MergeError::QueueFull { .. } | MergeError::AlreadyInProgress { .. } => {
                        StatusCode::CONFLICT
                    }
                    MergeError::InsufficientItems { .. } => StatusCode::BAD_REQUEST,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.category(), err.user_message())
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
