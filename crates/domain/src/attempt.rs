//! Attempts: the outcome of running one task against one model.

use crate::errors::{ErrorCategory, ModelError};
use crate::identifiers::{MetricId, ModelId, RunId, TaskId};
use crate::model::Generation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attempt status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    Succeeded,
    Failed,
    /// Failed transiently and another execution is scheduled.
    ///
    /// Reserved for in-flight records: the dispatcher only emits terminal
    /// attempts and reports retries as `RunEvent::AttemptRetrying`.
    Retrying,
}

impl AttemptStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Error recorded on an attempt, keeping its category for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
}

impl AttemptError {
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Cancelled,
            code: "CANCELLED".to_string(),
            message: message.into(),
        }
    }
}

impl From<&ModelError> for AttemptError {
    fn from(error: &ModelError) -> Self {
        Self {
            category: error.category(),
            code: error.error_code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Identity of an attempt record: `(run_id, task_id, model_id, attempt_number)`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttemptKey {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub model_id: ModelId,
    pub attempt_number: u32,
}

/// Terminal outcome of a `(task, model)` pair.
///
/// `attempt_number` counts executions, so a pair that succeeded on its second try
/// has `attempt_number == 2` and one entry in `retry_errors`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub run_id: RunId,
    pub task_id: TaskId,
    pub model_id: ModelId,
    pub attempt_number: u32,
    pub status: AttemptStatus,
    pub response_text: Option<String>,
    pub error: Option<AttemptError>,
    pub latency_seconds: f64,
    pub time_to_first_token_seconds: f64,
    pub token_count: u64,
    pub tokens_per_second: f64,
    pub api_cost: f64,
    pub infrastructure_cost: f64,
    pub total_cost: f64,
    /// Transient errors absorbed by earlier executions, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retry_errors: Vec<AttemptError>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl Attempt {
    /// Build a succeeded attempt from the measurements a model client returned.
    pub fn succeeded(
        run_id: RunId,
        task_id: TaskId,
        model_id: ModelId,
        attempt_number: u32,
        generation: Generation,
        started_at: DateTime<Utc>,
    ) -> Self {
        let tokens_per_second = generation.tokens_per_second();
        let total_cost = generation.total_cost();

        Self {
            run_id,
            task_id,
            model_id,
            attempt_number,
            status: AttemptStatus::Succeeded,
            response_text: Some(generation.text),
            error: None,
            latency_seconds: generation.latency_seconds,
            time_to_first_token_seconds: generation.time_to_first_token_seconds,
            token_count: generation.token_count,
            tokens_per_second,
            api_cost: generation.api_cost,
            infrastructure_cost: generation.infrastructure_cost,
            total_cost,
            retry_errors: Vec::new(),
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Build a failed attempt. Failed attempts carry no measurements besides latency.
    pub fn failed(
        run_id: RunId,
        task_id: TaskId,
        model_id: ModelId,
        attempt_number: u32,
        error: AttemptError,
        latency_seconds: f64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id,
            task_id,
            model_id,
            attempt_number,
            status: AttemptStatus::Failed,
            response_text: None,
            error: Some(error),
            latency_seconds,
            time_to_first_token_seconds: 0.0,
            token_count: 0,
            tokens_per_second: 0.0,
            api_cost: 0.0,
            infrastructure_cost: 0.0,
            total_cost: 0.0,
            retry_errors: Vec::new(),
            started_at,
            ended_at: Utc::now(),
        }
    }

    pub fn with_retry_errors(mut self, retry_errors: Vec<AttemptError>) -> Self {
        self.retry_errors = retry_errors;
        self
    }

    pub fn key(&self) -> AttemptKey {
        AttemptKey {
            run_id: self.run_id,
            task_id: self.task_id.clone(),
            model_id: self.model_id.clone(),
            attempt_number: self.attempt_number,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == AttemptStatus::Succeeded
    }
}

/// An attempt together with its metric scores.
///
/// A `None` score means the scorer failed for this attempt; the reason is kept in
/// `scorer_errors`. Failed attempts are never scored and have no entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredAttempt {
    #[serde(flatten)]
    pub attempt: Attempt,
    pub metric_scores: BTreeMap<MetricId, Option<f64>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scorer_errors: BTreeMap<MetricId, String>,
}

impl ScoredAttempt {
    pub fn unscored(attempt: Attempt) -> Self {
        Self {
            attempt,
            metric_scores: BTreeMap::new(),
            scorer_errors: BTreeMap::new(),
        }
    }

    pub fn score(&self, metric_id: &str) -> Option<f64> {
        self.metric_scores.get(metric_id).copied().flatten()
    }

    pub fn key(&self) -> AttemptKey {
        self.attempt.key()
    }
}
