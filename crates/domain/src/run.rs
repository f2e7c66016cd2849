//! Evaluation runs and their lifecycle.

use crate::errors::RunError;
use crate::identifiers::{DatasetId, MetricId, ModelId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use validator::Validate;

/// Run lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Partial,
}

impl RunStatus {
    /// Check whether a transition to `next` is allowed.
    ///
    /// `Pending -> Failed` covers configuration errors found before dispatch.
    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Running, Completed)
                | (Running, Partial)
                | (Running, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Partial)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Partial => "partial",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to evaluate a dataset against a set of models.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EvaluationRequest {
    #[validate(length(min = 1, max = 200))]
    pub experiment_name: String,
    pub dataset_id: DatasetId,
    #[validate(length(min = 1))]
    pub model_ids: Vec<ModelId>,
    /// Empty means "use the dataset's default metrics"
    #[serde(default)]
    pub metric_ids: Vec<MetricId>,
}

impl EvaluationRequest {
    pub fn new(
        experiment_name: impl Into<String>,
        dataset_id: impl Into<DatasetId>,
        model_ids: impl IntoIterator<Item = impl Into<ModelId>>,
        metric_ids: impl IntoIterator<Item = impl Into<MetricId>>,
    ) -> Self {
        Self {
            experiment_name: experiment_name.into(),
            dataset_id: dataset_id.into(),
            model_ids: model_ids.into_iter().map(Into::into).collect(),
            metric_ids: metric_ids.into_iter().map(Into::into).collect(),
        }
    }
}

/// One end-to-end evaluation of a dataset against models and metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub run_id: RunId,
    pub experiment_name: String,
    pub dataset_id: DatasetId,
    /// Display name of the dataset, known once it has been loaded
    #[serde(default)]
    pub dataset_name: String,
    pub model_ids: BTreeSet<ModelId>,
    pub metric_ids: BTreeSet<MetricId>,
    pub status: RunStatus,
    pub task_count: usize,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub cancelled: bool,
}

impl Run {
    /// Create a pending run with a freshly generated id.
    pub fn new(request: &EvaluationRequest) -> Self {
        Self {
            run_id: RunId::new(),
            experiment_name: request.experiment_name.clone(),
            dataset_id: request.dataset_id.clone(),
            dataset_name: request.dataset_id.to_string(),
            model_ids: request.model_ids.iter().cloned().collect(),
            metric_ids: request.metric_ids.iter().cloned().collect(),
            status: RunStatus::Pending,
            task_count: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            failure_reason: None,
            cancelled: false,
        }
    }

    /// Move to `next`, stamping `started_at`/`ended_at` as appropriate.
    pub fn transition(&mut self, next: RunStatus) -> Result<(), RunError> {
        if !self.status.can_transition_to(next) {
            return Err(RunError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        if next == RunStatus::Running {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.ended_at = Some(now);
        }
        self.status = next;
        Ok(())
    }

    /// Fail the run with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), RunError> {
        self.transition(RunStatus::Failed)?;
        self.failure_reason = Some(reason.into());
        Ok(())
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds() as f64 / 1000.0),
            _ => None,
        }
    }
}

/// Listing entry for a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOverview {
    pub run_id: RunId,
    pub experiment_name: String,
    pub dataset_id: DatasetId,
    pub models: Vec<ModelId>,
    pub metrics: Vec<MetricId>,
    pub status: RunStatus,
    pub task_count: usize,
    pub created_at: DateTime<Utc>,
}

impl From<&Run> for RunOverview {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.run_id,
            experiment_name: run.experiment_name.clone(),
            dataset_id: run.dataset_id.clone(),
            models: run.model_ids.iter().cloned().collect(),
            metrics: run.metric_ids.iter().cloned().collect(),
            status: run.status,
            task_count: run.task_count,
            created_at: run.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> EvaluationRequest {
        EvaluationRequest::new("exp", "ds", ["m1", "m2", "m1"], ["f1"])
    }

    #[test]
    fn test_new_run_is_pending_and_dedups_models() {
        let run = Run::new(&request());
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.model_ids.len(), 2);
        assert!(run.started_at.is_none());
    }

    #[test]
    fn test_transition_stamps_timestamps() {
        let mut run = Run::new(&request());
        run.transition(RunStatus::Running).unwrap();
        assert!(run.started_at.is_some());
        assert!(run.ended_at.is_none());
        run.transition(RunStatus::Completed).unwrap();
        assert!(run.ended_at.is_some());
        assert!(run.duration_seconds().is_some());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut run = Run::new(&request());
        run.transition(RunStatus::Running).unwrap();
        run.transition(RunStatus::Partial).unwrap();
        let err = run.transition(RunStatus::Completed).unwrap_err();
        assert_eq!(
            err,
            RunError::InvalidTransition {
                from: RunStatus::Partial,
                to: RunStatus::Completed
            }
        );
    }

    #[test]
    fn test_request_validation() {
        assert!(request().validate().is_ok());
        let empty = EvaluationRequest::new("", "ds", ["m1"], Vec::<String>::new());
        assert!(empty.validate().is_err());
        let no_models = EvaluationRequest::new("exp", "ds", Vec::<String>::new(), ["f1"]);
        assert!(no_models.validate().is_err());
    }
}
