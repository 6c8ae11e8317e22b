//! Error types for submitr
//!
//! Centralized error handling using thiserror. Provider failures never escape the
//! orchestrator; they are converted to fallbacks inside the guard. Only admission,
//! configuration and persistence problems surface as `SubmitrError`.

use std::time::Duration;

use thiserror::Error;

/// All error types that can surface from submitr
#[derive(Debug, Error)]
pub enum SubmitrError {
    /// Malformed submission request
    #[error("Admission rejected: {0}")]
    Admission(#[from] AdmissionError),

    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Persistence collaborator error
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for submitr operations
pub type Result<T> = std::result::Result<T, SubmitrError>;

/// Reasons a submission request is refused before any queue mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// A required target field is empty
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The directory URL does not contain a usable host
    #[error("invalid directory url: {0}")]
    InvalidUrl(String),
}

/// Failure of a single advisory provider call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The call did not finish within its deadline
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The breaker refused the call
    #[error("circuit open")]
    Rejected,

    /// The provider answered with data that violates its contract
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The provider reported an error
    #[error("provider failed: {0}")]
    Failed(String),
}

/// Worker protocol violations. Logged and ignored since workers retry network calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// No job with this id is known
    #[error("unknown job: {0}")]
    UnknownJob(String),

    /// The job already reached a terminal status
    #[error("job {job_id} is already {status}")]
    AlreadyTerminal { job_id: String, status: String },

    /// The job was cancelled while dispatched
    #[error("job {0} was cancelled")]
    Cancelled(String),

    /// The job is not currently dispatched
    #[error("job {0} is not dispatched")]
    NotDispatched(String),

    /// The reporting worker does not hold the dispatch
    #[error("job {job_id} is held by {holder}, not {worker_id}")]
    WorkerMismatch {
        job_id: String,
        holder: String,
        worker_id: String,
    },
}
