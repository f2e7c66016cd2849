//! Error types for the evaluation domain.
//!
//! The taxonomy follows how each failure affects a run:
//!
//! - [`ModelError`]: a single model call failed. Transient variants are retried,
//!   permanent ones fail the attempt. Neither fails the run.
//! - [`ConfigurationError`]: the run cannot be set up and fails outright.
//! - [`ScorerError`]: one metric could not score one attempt; recorded as a null score.
//! - [`RunError`]: client-facing query errors plus lifecycle violations.

use crate::identifiers::*;
use crate::run::RunStatus;
use serde::{Deserialize, Serialize};

/// Top-level error type
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// Run setup errors
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Run lookup and lifecycle errors
    #[error("Run error: {0}")]
    Run(#[from] RunError),

    /// Result log errors
    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),

    /// A one-off model call failed
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Request validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl EvalError {
    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Run(RunError::NotFound(_)) => "NOT_FOUND",
            Self::Run(RunError::NotReady { .. }) => "NOT_READY",
            Self::Run(_) => "RUN_ERROR",
            Self::Collector(_) => "COLLECTOR_ERROR",
            Self::Model(e) => e.error_code(),
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Configuration(_) | Self::Validation(_) => 400,
            Self::Run(RunError::NotFound(_)) => 404,
            Self::Run(RunError::NotReady { .. }) => 409,
            Self::Run(RunError::RunFailed { .. }) => 422,
            Self::Run(RunError::InvalidTransition { .. }) => 409,
            Self::Model(ModelError::Timeout(_)) => 504,
            Self::Model(ModelError::RateLimited(_)) => 429,
            Self::Model(_) => 502,
            Self::Collector(_) | Self::Internal(_) => 500,
        }
    }
}

/// Whether a failed attempt may be retried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Transient,
    Permanent,
    /// Aborted because the run was cancelled
    Cancelled,
}

/// Model call failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    /// The call did not finish in time
    #[error("request timed out: {0}")]
    Timeout(String),

    /// The backend asked us to slow down
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The backend failed (5xx-equivalent)
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The backend could not be reached
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request was rejected as malformed
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Credentials missing or rejected
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The backend answered with something we cannot interpret
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout(_) | Self::RateLimited(_) | Self::Server { .. } | Self::Connection(_) => {
                ErrorCategory::Transient
            }
            Self::InvalidRequest(_) | Self::Authentication(_) | Self::InvalidResponse(_) => {
                ErrorCategory::Permanent
            }
        }
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "TIMEOUT",
            Self::RateLimited(_) => "RATE_LIMITED",
            Self::Server { .. } => "SERVER_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Authentication(_) => "AUTHENTICATION_ERROR",
            Self::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }

    /// Classify an HTTP status returned by a model backend.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            408 => Self::Timeout(message),
            429 => Self::RateLimited(message),
            401 | 403 => Self::Authentication(message),
            500..=599 => Self::Server { status, message },
            _ => Self::InvalidRequest(format!("HTTP {status}: {message}")),
        }
    }
}

/// Errors that prevent a run from being dispatched
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("Dataset not found: {0}")]
    DatasetNotFound(DatasetId),

    #[error("Dataset has no tasks: {0}")]
    EmptyDataset(DatasetId),

    #[error("Dataset {dataset_id} contains duplicate task id: {task_id}")]
    DuplicateTask { dataset_id: DatasetId, task_id: TaskId },

    #[error("Model not found: {0}")]
    ModelNotFound(ModelId),

    #[error("No scorer registered for metric: {0}")]
    MetricNotFound(MetricId),

    #[error("No metrics requested and dataset has no task type")]
    NoMetrics,

    #[error("Cannot create client for model {model_id}: {message}")]
    Backend { model_id: ModelId, message: String },

    #[error("Configuration source unavailable: {0}")]
    Source(String),
}

/// Errors raised by a metric scorer for one attempt
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScorerError {
    #[error("task has no reference answer")]
    MissingReference,

    #[error("task has no context")]
    MissingContext,

    #[error("score {0} is not a finite number")]
    NonFinite(f64),

    #[error("scoring failed: {0}")]
    Failed(String),
}

/// Run lookup and lifecycle errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunError {
    #[error("Run not found: {0}")]
    NotFound(RunId),

    #[error("Run {run_id} is not ready (status: {status})")]
    NotReady { run_id: RunId, status: RunStatus },

    #[error("Run {run_id} failed: {reason}")]
    RunFailed { run_id: RunId, reason: String },

    #[error("Run status transition not allowed: {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },
}

/// Result log errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollectorError {
    #[error("Result log for run {0} is sealed")]
    Sealed(RunId),

    #[error("Duplicate attempt {attempt_number} for task {task_id} on model {model_id}")]
    Duplicate {
        task_id: TaskId,
        model_id: ModelId,
        attempt_number: u32,
    },
}

/// Result type alias
pub type EvalResult<T> = Result<T, EvalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_error_classification() {
        assert!(ModelError::Timeout("t".into()).is_retryable());
        assert!(ModelError::RateLimited("r".into()).is_retryable());
        assert!(ModelError::Connection("c".into()).is_retryable());
        assert!(ModelError::Server { status: 503, message: "down".into() }.is_retryable());
        assert!(!ModelError::InvalidRequest("bad".into()).is_retryable());
        assert!(!ModelError::Authentication("key".into()).is_retryable());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(ModelError::from_status(429, "slow").category(), ErrorCategory::Transient);
        assert_eq!(ModelError::from_status(408, "t").category(), ErrorCategory::Transient);
        assert_eq!(ModelError::from_status(502, "gw").category(), ErrorCategory::Transient);
        assert_eq!(ModelError::from_status(401, "no").category(), ErrorCategory::Permanent);
        assert_eq!(ModelError::from_status(400, "bad").category(), ErrorCategory::Permanent);
        assert_eq!(ModelError::from_status(404, "gone").category(), ErrorCategory::Permanent);
    }

    #[test]
    fn test_http_status() {
        let run_id = RunId::new();
        assert_eq!(EvalError::from(RunError::NotFound(run_id)).http_status(), 404);
        assert_eq!(
            EvalError::from(RunError::NotReady { run_id, status: RunStatus::Running }).http_status(),
            409
        );
        assert_eq!(
            EvalError::from(ConfigurationError::ModelNotFound(ModelId::from("x"))).http_status(),
            400
        );
    }

    #[test]
    fn test_error_codes() {
        let run_id = RunId::new();
        assert_eq!(EvalError::from(RunError::NotFound(run_id)).error_code(), "NOT_FOUND");
        assert_eq!(ModelError::from_status(429, "").error_code(), "RATE_LIMITED");
    }
}
