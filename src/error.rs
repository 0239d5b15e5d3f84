//! Error types for trueno-traverse
//!
//! One closed taxonomy for every pipeline stage. The orchestrator maps each
//! variant to a terminal job status and a `"<kind>: <message>"` string.

use std::fmt;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// trueno-traverse error types
#[derive(Error, Debug)]
pub enum Error {
    /// Bad column mapping, missing/extra spacing, malformed scenario
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Missing columns, unparsable cells, empty file, no measured rows
    #[error("Invalid data: {0}")]
    Data(String),

    /// Spacing <= 0 or too few anchor stations for sparse geometry
    #[error("Geometry error: {0}")]
    Geometry(String),

    /// Inference collaborator failed or returned a malformed response
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Poll loop for an asynchronous result exceeded its bound
    #[error("Timed out after {waited_secs:.1}s waiting for {key}")]
    Timeout {
        /// Storage key that never appeared
        key: String,
        /// Seconds spent waiting
        waited_secs: f64,
    },

    /// Prediction count or key mismatch
    #[error("Merge failed: {0}")]
    Merge(String),

    /// Blob storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// No job record under the given id
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// Job exists but has no published result
    #[error("Result unavailable for job {job_id} (status: {status})")]
    ResultUnavailable {
        /// Job identifier
        job_id: String,
        /// Current status
        status: String,
    },

    /// Illegal job status transition (terminal states are final)
    #[error("Invalid job transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status
        from: String,
        /// Requested status
        to: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Coarse classification of an [`Error`], as reported in job records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request rejected before any stage ran
    Validation,
    /// Input data rejected
    Data,
    /// Geometry preconditions violated
    Geometry,
    /// Collaborator failure
    Inference,
    /// Poll bound exceeded
    Timeout,
    /// Prediction merge contract violated
    Merge,
    /// Storage, IO and bookkeeping failures
    Internal,
}

impl ErrorKind {
    /// Taxonomy name used in job messages
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "ValidationError",
            Self::Data => "DataError",
            Self::Geometry => "GeometryError",
            Self::Inference => "InferenceError",
            Self::Timeout => "TimeoutError",
            Self::Merge => "MergeError",
            Self::Internal => "InternalError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Classify this error
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Data(_) => ErrorKind::Data,
            Self::Geometry(_) => ErrorKind::Geometry,
            Self::Inference(_) => ErrorKind::Inference,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Merge(_) => ErrorKind::Merge,
            Self::Storage(_)
            | Self::JobNotFound(_)
            | Self::ResultUnavailable { .. }
            | Self::InvalidTransition { .. }
            | Self::Io(_)
            | Self::Json(_) => ErrorKind::Internal,
        }
    }

    /// Message stored on a failed job record
    #[must_use]
    pub fn job_message(&self) -> String {
        format!("{}: {self}", self.kind())
    }
}
