//! Run summaries: per-model aggregates and their per-metric pivot.

use crate::identifiers::{DatasetId, MetricId, ModelId, RunId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean score per model for one metric
pub type MetricSummary = BTreeMap<ModelId, f64>;

/// Aggregates for one model over a run's succeeded attempts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub model_id: ModelId,
    pub attempt_count: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub no_successful_attempts: bool,
    pub avg_latency: f64,
    pub avg_time_to_first_token: f64,
    pub avg_tokens_per_second: f64,
    pub avg_tokens: f64,
    pub total_api_cost: f64,
    pub total_infrastructure_cost: f64,
    pub total_cost: f64,
    /// Mean total cost per succeeded attempt
    pub avg_cost: f64,
    pub metric_scores: BTreeMap<MetricId, f64>,
}

impl ModelSummary {
    /// Summary for a model with no succeeded attempts: every number is zero.
    pub fn without_successes<'a>(
        model_id: ModelId,
        failure_count: usize,
        metric_ids: impl IntoIterator<Item = &'a MetricId>,
    ) -> Self {
        Self {
            model_id,
            attempt_count: failure_count,
            success_count: 0,
            failure_count,
            no_successful_attempts: true,
            avg_latency: 0.0,
            avg_time_to_first_token: 0.0,
            avg_tokens_per_second: 0.0,
            avg_tokens: 0.0,
            total_api_cost: 0.0,
            total_infrastructure_cost: 0.0,
            total_cost: 0.0,
            avg_cost: 0.0,
            metric_scores: metric_ids.into_iter().map(|m| (m.clone(), 0.0)).collect(),
        }
    }
}

/// Aggregated view of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub run_id: RunId,
    pub experiment_name: String,
    pub dataset_id: DatasetId,
    pub dataset_name: String,
    pub models: Vec<ModelId>,
    pub metrics: Vec<MetricId>,
    pub task_count: usize,
    /// When the run started (or was created, if it never started)
    pub timestamp: DateTime<Utc>,
    pub model_summaries: BTreeMap<ModelId, ModelSummary>,
    pub metric_summaries: BTreeMap<MetricId, MetricSummary>,
}

impl Summary {
    pub fn models_without_successes(&self) -> impl Iterator<Item = &ModelId> {
        self.model_summaries
            .values()
            .filter(|s| s.no_successful_attempts)
            .map(|s| &s.model_id)
    }
}

/// Pivot per-model metric scores into per-metric summaries.
pub fn pivot_metric_scores<'a>(
    model_summaries: impl IntoIterator<Item = &'a ModelSummary>,
) -> BTreeMap<MetricId, MetricSummary> {
    let mut pivot: BTreeMap<MetricId, MetricSummary> = BTreeMap::new();
    for summary in model_summaries {
        for (metric_id, score) in &summary.metric_scores {
            pivot
                .entry(metric_id.clone())
                .or_default()
                .insert(summary.model_id.clone(), *score);
        }
    }
    pivot
}

/// Inverse of [`pivot_metric_scores`]: per-model metric scores from per-metric summaries.
pub fn unpivot_metric_summaries(
    metric_summaries: &BTreeMap<MetricId, MetricSummary>,
) -> BTreeMap<ModelId, BTreeMap<MetricId, f64>> {
    let mut per_model: BTreeMap<ModelId, BTreeMap<MetricId, f64>> = BTreeMap::new();
    for (metric_id, by_model) in metric_summaries {
        for (model_id, score) in by_model {
            per_model
                .entry(model_id.clone())
                .or_default()
                .insert(metric_id.clone(), *score);
        }
    }
    per_model
}
