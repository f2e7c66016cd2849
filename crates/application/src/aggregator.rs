//! Metrics aggregator.
//!
//! Scores terminal attempts and folds a run's scored attempts into its
//! [`Summary`]. Attempts are put in canonical key order before any floating
//! point reduction, so the result does not depend on completion order, and the
//! incremental [`Aggregation`] produces exactly what the batch [`aggregate`] does.

use crate::scoring::ScorerRegistry;
use llm_eval_domain::summary::pivot_metric_scores;
use llm_eval_domain::{
    Attempt, AttemptKey, ConfigurationError, MetricId, ModelId, ModelSummary, Run, ScoredAttempt,
    ScorerError, Summary, Task,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Scores attempts with registered scorers and builds run summaries.
#[derive(Debug, Clone)]
pub struct MetricsAggregator {
    registry: Arc<ScorerRegistry>,
}

impl MetricsAggregator {
    pub fn new(registry: Arc<ScorerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ScorerRegistry {
        &self.registry
    }

    /// Check that every metric id has a scorer.
    pub fn ensure_scorers<'a>(
        &self,
        metric_ids: impl IntoIterator<Item = &'a MetricId>,
    ) -> Result<(), ConfigurationError> {
        self.registry.resolve(metric_ids).map(|_| ())
    }

    /// Score a terminal attempt on every metric, once each.
    ///
    /// Failed attempts are returned unscored. A scorer error, or a non-finite
    /// score, becomes a `None` score with the reason kept in `scorer_errors`.
    #[instrument(skip_all, fields(task_id = %attempt.task_id, model_id = %attempt.model_id))]
    pub async fn score(&self, attempt: Attempt, task: &Task, metric_ids: &[MetricId]) -> ScoredAttempt {
        let mut scored = ScoredAttempt::unscored(attempt);
        if !scored.attempt.is_success() {
            return scored;
        }

        let response = scored.attempt.response_text.clone().unwrap_or_default();
        for metric_id in metric_ids {
            let outcome = match self.registry.get(metric_id.as_str()) {
                Some(scorer) => scorer.score(&response, task).await.and_then(|value| {
                    if value.is_finite() {
                        Ok(value)
                    } else {
                        Err(ScorerError::NonFinite(value))
                    }
                }),
                None => Err(ScorerError::Failed(format!(
                    "no scorer registered for {metric_id}"
                ))),
            };

            match outcome {
                Ok(value) => {
                    scored.metric_scores.insert(metric_id.clone(), Some(value));
                }
                Err(error) => {
                    warn!(metric_id = %metric_id, error = %error, "Scorer failed");
                    scored.metric_scores.insert(metric_id.clone(), None);
                    scored.scorer_errors.insert(metric_id.clone(), error.to_string());
                }
            }
        }

        scored
    }

    /// Build the run summary from its scored attempts.
    pub fn aggregate(&self, run: &Run, scored: &[ScoredAttempt]) -> Summary {
        aggregate(run, scored)
    }
}

/// Build a run summary from scored attempts, in any order.
pub fn aggregate(run: &Run, scored: &[ScoredAttempt]) -> Summary {
    let mut ordered: Vec<(AttemptKey, &ScoredAttempt)> =
        scored.iter().map(|s| (s.key(), s)).collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));
    summarize(run, ordered.into_iter().map(|(_, s)| s))
}

/// `attempts` must already be in canonical key order.
fn summarize<'a>(run: &Run, attempts: impl Iterator<Item = &'a ScoredAttempt>) -> Summary {
    let mut by_model: BTreeMap<&ModelId, Vec<&ScoredAttempt>> = BTreeMap::new();
    for attempt in attempts {
        by_model.entry(&attempt.attempt.model_id).or_default().push(attempt);
    }

    let model_summaries: BTreeMap<ModelId, ModelSummary> = run
        .model_ids
        .iter()
        .map(|model_id| {
            let attempts = by_model.get(model_id).map(Vec::as_slice).unwrap_or(&[]);
            (model_id.clone(), summarize_model(model_id, attempts, &run.metric_ids))
        })
        .collect();

    let metric_summaries = pivot_metric_scores(model_summaries.values());

    debug!(
        run_id = %run.run_id,
        models = model_summaries.len(),
        metrics = metric_summaries.len(),
        "Aggregated run"
    );

    Summary {
        run_id: run.run_id,
        experiment_name: run.experiment_name.clone(),
        dataset_id: run.dataset_id.clone(),
        dataset_name: run.dataset_name.clone(),
        models: run.model_ids.iter().cloned().collect(),
        metrics: run.metric_ids.iter().cloned().collect(),
        task_count: run.task_count,
        timestamp: run.started_at.unwrap_or(run.created_at),
        model_summaries,
        metric_summaries,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

fn summarize_model(
    model_id: &ModelId,
    attempts: &[&ScoredAttempt],
    metric_ids: &BTreeSet<MetricId>,
) -> ModelSummary {
    let succeeded: Vec<&Attempt> = attempts
        .iter()
        .map(|s| &s.attempt)
        .filter(|a| a.is_success())
        .collect();
    let failure_count = attempts.len() - succeeded.len();

    if succeeded.is_empty() {
        return ModelSummary::without_successes(model_id.clone(), failure_count, metric_ids);
    }

    let total_api_cost: f64 = succeeded.iter().map(|a| a.api_cost).sum();
    let total_infrastructure_cost: f64 = succeeded.iter().map(|a| a.infrastructure_cost).sum();
    let total_cost = total_api_cost + total_infrastructure_cost;

    let metric_scores = metric_ids
        .iter()
        .map(|metric_id| {
            let score = mean(
                attempts
                    .iter()
                    .filter(|s| s.attempt.is_success())
                    .filter_map(|s| s.score(metric_id.as_str())),
            );
            (metric_id.clone(), score)
        })
        .collect();

    ModelSummary {
        model_id: model_id.clone(),
        attempt_count: attempts.len(),
        success_count: succeeded.len(),
        failure_count,
        no_successful_attempts: false,
        avg_latency: mean(succeeded.iter().map(|a| a.latency_seconds)),
        avg_time_to_first_token: mean(succeeded.iter().map(|a| a.time_to_first_token_seconds)),
        avg_tokens_per_second: mean(succeeded.iter().map(|a| a.tokens_per_second)),
        avg_tokens: mean(succeeded.iter().map(|a| a.token_count as f64)),
        total_api_cost,
        total_infrastructure_cost,
        total_cost,
        avg_cost: total_cost / succeeded.len() as f64,
        metric_scores,
    }
}

/// Incremental aggregation over a run's scored attempts.
///
/// Attempts are kept in canonical key order, so [`Aggregation::summary`] always
/// equals [`aggregate`] over the same set.
#[derive(Debug, Clone)]
pub struct Aggregation {
    run: Run,
    attempts: BTreeMap<AttemptKey, ScoredAttempt>,
}

impl Aggregation {
    pub fn new(run: Run) -> Self {
        Self {
            run,
            attempts: BTreeMap::new(),
        }
    }

    /// Add a scored attempt. Returns `false` if its key was already present.
    pub fn push(&mut self, scored: ScoredAttempt) -> bool {
        let key = scored.key();
        if self.attempts.contains_key(&key) {
            return false;
        }
        self.attempts.insert(key, scored);
        true
    }

    /// Refresh the run metadata the summary is labelled with.
    pub fn set_run(&mut self, run: Run) {
        self.run = run;
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn summary(&self) -> Summary {
        summarize(&self.run, self.attempts.values())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use llm_eval_domain::{AttemptError, EvaluationRequest, Generation, RunStatus, TaskId};

    fn run() -> Run {
        let mut run = Run::new(&EvaluationRequest::new("exp", "ds", ["a", "b"], ["f1"]));
        run.task_count = 2;
        run.transition(RunStatus::Running).unwrap();
        run
    }

    fn success(run: &Run, task: &str, model: &str, latency: f64, score: Option<f64>) -> ScoredAttempt {
        let attempt = Attempt::succeeded(
            run.run_id,
            TaskId::from(task),
            ModelId::from(model),
            1,
            Generation {
                text: "x".into(),
                token_count: 10,
                prompt_tokens: 5,
                time_to_first_token_seconds: 0.1,
                latency_seconds: latency,
                api_cost: 0.002,
                infrastructure_cost: 0.001,
            },
            Utc::now(),
        );
        let mut scored = ScoredAttempt::unscored(attempt);
        scored.metric_scores.insert(MetricId::from("f1"), score);
        scored
    }

    fn failure(run: &Run, task: &str, model: &str) -> ScoredAttempt {
        ScoredAttempt::unscored(Attempt::failed(
            run.run_id,
            TaskId::from(task),
            ModelId::from(model),
            4,
            AttemptError::cancelled("x"),
            1.0,
            Utc::now(),
        ))
    }

    #[test]
    fn test_means_use_only_succeeded_attempts() {
        let run = run();
        let scored = vec![
            success(&run, "t1", "a", 1.0, Some(0.5)),
            success(&run, "t2", "a", 3.0, Some(1.0)),
            failure(&run, "t1", "b"),
            success(&run, "t2", "b", 2.0, Some(0.25)),
        ];

        let summary = aggregate(&run, &scored);
        let a = &summary.model_summaries[&ModelId::from("a")];
        assert_eq!(a.success_count, 2);
        assert_eq!(a.avg_latency, 2.0);
        assert_eq!(a.metric_scores[&MetricId::from("f1")], 0.75);

        let b = &summary.model_summaries[&ModelId::from("b")];
        assert_eq!(b.failure_count, 1);
        assert_eq!(b.success_count, 1);
        assert_eq!(b.avg_latency, 2.0);
        assert!((b.total_cost - 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_zero_success_model_is_present_with_zeros() {
        let run = run();
        let scored = vec![success(&run, "t1", "a", 1.0, Some(1.0)), failure(&run, "t1", "b")];

        let summary = aggregate(&run, &scored);
        let b = &summary.model_summaries[&ModelId::from("b")];
        assert!(b.no_successful_attempts);
        assert_eq!(b.avg_latency, 0.0);
        assert_eq!(b.total_cost, 0.0);
        assert_eq!(summary.metric_summaries["f1"][&ModelId::from("b")], 0.0);
        assert_eq!(summary.models_without_successes().count(), 1);
    }

    #[test]
    fn test_all_null_scores_report_zero() {
        let run = run();
        let scored = vec![success(&run, "t1", "a", 1.0, None)];
        let summary = aggregate(&run, &scored);
        assert_eq!(summary.model_summaries[&ModelId::from("a")].metric_scores["f1"], 0.0);
    }

    #[test]
    fn test_incremental_matches_batch() {
        let run = run();
        let scored = vec![
            success(&run, "t2", "b", 0.3, Some(0.1)),
            success(&run, "t1", "a", 0.7, Some(0.2)),
            failure(&run, "t1", "b"),
            success(&run, "t2", "a", 0.1, Some(0.3)),
        ];

        let mut aggregation = Aggregation::new(run.clone());
        for s in &scored {
            assert!(aggregation.push(s.clone()));
        }
        assert!(!aggregation.push(scored[0].clone()));

        assert_eq!(aggregation.summary(), aggregate(&run, &scored));
    }
}
