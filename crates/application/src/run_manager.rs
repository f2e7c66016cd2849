//! Run manager.
//!
//! Owns the lifecycle of evaluation runs: creates runs, resolves their
//! configuration, drives dispatch → scoring → collection in the background,
//! and decides the final status. Runs move through
//! `pending → running → {completed, partial, failed}`, or straight from
//! `pending` to `failed` when their configuration cannot be resolved.

use crate::aggregator::{aggregate, Aggregation, MetricsAggregator};
use crate::collector::ResultCollector;
use crate::dispatch::{DispatchControl, DispatchTarget, Dispatcher};
use crate::events::{BroadcastEventPublisher, EventPublisher, RunEvent};
use crate::ports::{DatasetProvider, ModelCatalog, ModelClientProvider};
use crate::scoring::ScorerRegistry;
use llm_eval_common::EvalConfig;
use llm_eval_domain::{
    ConfigurationError, Dataset, DatasetInfo, EvalError, EvaluationRequest, GenerationOptions,
    MetricId, ModelDescriptor, ModelError, ModelId, Run, RunError, RunId, RunOverview, RunStatus,
    ScoredAttempt, Summary, TaskId,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Whether a summary may be computed for a run that is still in progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SummaryMode {
    /// Only terminal runs have a summary
    #[default]
    FinalOnly,
    /// Running runs return a summary of what has been collected so far
    AllowPartial,
}

/// Result of a one-off generation outside any run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptResponse {
    pub response_id: Uuid,
    pub model_id: ModelId,
    pub response: String,
    pub latency_seconds: f64,
    pub time_to_first_token_seconds: f64,
    pub tokens_per_second: f64,
    pub token_count: u64,
    pub api_cost: f64,
    pub infrastructure_cost: f64,
    pub total_cost: f64,
}

struct RunEntry {
    run: Run,
    control: DispatchControl,
    aggregation: Aggregation,
    summary: Option<Summary>,
    status_tx: watch::Sender<RunStatus>,
}

/// Everything a run needs once its configuration has been resolved
struct RunPlan {
    dataset: Dataset,
    metric_ids: Vec<MetricId>,
    targets: Vec<DispatchTarget>,
}

struct Inner {
    config: Arc<EvalConfig>,
    datasets: Arc<dyn DatasetProvider>,
    models: Arc<dyn ModelCatalog>,
    clients: Arc<dyn ModelClientProvider>,
    aggregator: MetricsAggregator,
    collector: Arc<ResultCollector>,
    events: Arc<BroadcastEventPublisher>,
    dispatcher: Dispatcher,
    runs: RwLock<HashMap<RunId, RunEntry>>,
}

/// Entry point for starting, observing and cancelling evaluation runs.
///
/// Cheap to clone; clones share the same runs.
#[derive(Clone)]
pub struct RunManager {
    inner: Arc<Inner>,
}

impl RunManager {
    pub fn new(
        config: Arc<EvalConfig>,
        datasets: Arc<dyn DatasetProvider>,
        models: Arc<dyn ModelCatalog>,
        clients: Arc<dyn ModelClientProvider>,
        scorers: Arc<ScorerRegistry>,
    ) -> Self {
        let events = Arc::new(BroadcastEventPublisher::default());
        let dispatcher = Dispatcher::from_config(&config, events.clone());

        Self {
            inner: Arc::new(Inner {
                config,
                datasets,
                models,
                clients,
                aggregator: MetricsAggregator::new(scorers),
                collector: Arc::new(ResultCollector::new()),
                events,
                dispatcher,
                runs: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn config(&self) -> &EvalConfig {
        &self.inner.config
    }

    pub fn scorers(&self) -> &ScorerRegistry {
        self.inner.aggregator.registry()
    }

    pub fn collector(&self) -> Arc<ResultCollector> {
        self.inner.collector.clone()
    }

    /// Receive events for every run started after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.inner.events.subscribe()
    }

    /// Models available to evaluate, sorted by id
    pub async fn list_models(&self) -> Result<Vec<ModelDescriptor>, EvalError> {
        Ok(self.inner.models.descriptors().await?.into_values().collect())
    }

    /// Datasets available to evaluate
    pub async fn list_datasets(&self) -> Result<Vec<DatasetInfo>, EvalError> {
        Ok(self.inner.datasets.list().await?)
    }

    /// Create a run and start evaluating it in the background.
    ///
    /// Configuration problems do not fail the call: the run is created, moves
    /// to `failed` with the reason recorded, and its id is still returned.
    #[instrument(skip(self, request), fields(experiment = %request.experiment_name))]
    pub async fn start_evaluation(&self, request: EvaluationRequest) -> Result<RunId, EvalError> {
        request
            .validate()
            .map_err(|e| EvalError::Validation(e.to_string()))?;

        let run = Run::new(&request);
        let run_id = run.run_id;
        let control = DispatchControl::new();
        let (status_tx, _) = watch::channel(RunStatus::Pending);

        self.inner.collector.open(run_id);
        self.inner.runs.write().insert(
            run_id,
            RunEntry {
                aggregation: Aggregation::new(run.clone()),
                run,
                control: control.clone(),
                summary: None,
                status_tx,
            },
        );
        info!(run_id = %run_id, "Run created");

        match self.inner.prepare(&request).await {
            Ok(plan) => {
                let run = self.inner.mark_running(run_id, &plan)?;
                self.inner
                    .publish(RunEvent::RunStarted {
                        run_id,
                        task_count: run.task_count,
                        model_count: run.model_ids.len(),
                    })
                    .await;

                let inner = self.inner.clone();
                tokio::spawn(async move {
                    inner.drive(run_id, plan, control).await;
                });
            }
            Err(error) => {
                warn!(run_id = %run_id, error = %error, "Run configuration failed");
                self.inner.fail_setup(run_id, &error).await;
            }
        }

        Ok(run_id)
    }

    pub fn get_status(&self, run_id: RunId) -> Result<RunStatus, EvalError> {
        self.with_entry(run_id, |entry| entry.run.status)
    }

    pub fn get_run(&self, run_id: RunId) -> Result<Run, EvalError> {
        self.with_entry(run_id, |entry| entry.run.clone())
    }

    /// Overview of every run, newest first
    pub fn list_runs(&self) -> Vec<RunOverview> {
        let mut runs: Vec<RunOverview> = self
            .inner
            .runs
            .read()
            .values()
            .map(|entry| RunOverview::from(&entry.run))
            .collect();
        runs.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.run_id.cmp(&b.run_id))
        });
        runs
    }

    /// Summary of a run.
    ///
    /// Fails with `NotFound` for unknown runs, `RunFailed` for runs that never
    /// dispatched, and `NotReady` for runs in progress unless `mode` allows a
    /// partial summary.
    pub fn get_summary(&self, run_id: RunId, mode: SummaryMode) -> Result<Summary, EvalError> {
        let runs = self.inner.runs.read();
        let entry = runs.get(&run_id).ok_or(RunError::NotFound(run_id))?;

        match entry.run.status {
            RunStatus::Failed => Err(RunError::RunFailed {
                run_id,
                reason: entry.run.failure_reason.clone().unwrap_or_default(),
            }
            .into()),
            status if status.is_terminal() => entry
                .summary
                .clone()
                .ok_or_else(|| EvalError::Internal(format!("run {run_id} has no summary"))),
            status => match mode {
                SummaryMode::AllowPartial => Ok(entry.aggregation.summary()),
                SummaryMode::FinalOnly => Err(RunError::NotReady { run_id, status }.into()),
            },
        }
    }

    /// Scored attempts of a run, in the order they were recorded
    pub fn get_run_results(&self, run_id: RunId) -> Result<Vec<ScoredAttempt>, EvalError> {
        self.with_entry(run_id, |_| ())?;
        Ok(self.inner.collector.snapshot(run_id))
    }

    /// Cancel a run.
    ///
    /// No new executions start once the cancel is observed. In-flight calls may
    /// finish within the configured grace period; after it they are aborted and
    /// recorded as cancelled. The run ends `partial`. Cancelling a finished run
    /// is a no-op.
    #[instrument(skip(self))]
    pub async fn cancel(&self, run_id: RunId) -> Result<(), EvalError> {
        let (control, mut status_rx) = {
            let mut runs = self.inner.runs.write();
            let entry = runs.get_mut(&run_id).ok_or(RunError::NotFound(run_id))?;
            if entry.run.status.is_terminal() || entry.run.cancelled {
                return Ok(());
            }
            entry.run.cancelled = true;
            entry.control.cancel();
            (entry.control.clone(), entry.status_tx.subscribe())
        };

        info!(run_id = %run_id, "Run cancelled");
        self.inner.publish(RunEvent::RunCancelled { run_id }).await;

        let grace = self.inner.config.grace_period();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(grace) => {
                    warn!(run_id = %run_id, "Grace period elapsed, aborting in-flight attempts");
                    control.abort();
                }
                _ = status_rx.wait_for(|status| status.is_terminal()) => {}
            }
        });

        Ok(())
    }

    /// Wait until a run reaches a terminal status.
    pub async fn wait(&self, run_id: RunId) -> Result<RunStatus, EvalError> {
        let mut status_rx = self.with_entry(run_id, |entry| entry.status_tx.subscribe())?;
        let status = *status_rx
            .wait_for(|status| status.is_terminal())
            .await
            .map_err(|_| EvalError::Internal(format!("status channel for run {run_id} closed")))?;
        Ok(status)
    }

    /// Drop a terminal run and its result log.
    ///
    /// Runs still pending or running are kept and yield `NotReady`.
    pub fn forget(&self, run_id: RunId) -> Result<(), EvalError> {
        {
            let mut runs = self.inner.runs.write();
            let status = runs
                .get(&run_id)
                .ok_or(RunError::NotFound(run_id))?
                .run
                .status;
            if !status.is_terminal() {
                return Err(RunError::NotReady { run_id, status }.into());
            }
            runs.remove(&run_id);
        }
        self.inner.collector.remove(run_id);
        debug!(run_id = %run_id, "Run forgotten");
        Ok(())
    }

    /// Send one prompt to one model, outside any run. No retries.
    #[instrument(skip(self, prompt), fields(model_id = %model_id))]
    pub async fn generate_response(
        &self,
        model_id: &ModelId,
        prompt: &str,
    ) -> Result<PromptResponse, EvalError> {
        let descriptor = self.inner.models.descriptor(model_id).await?;
        let client = self.inner.clients.client_for(&descriptor)?;

        let timeout = self.inner.config.request_timeout();
        let options = GenerationOptions {
            timeout,
            ..GenerationOptions::default()
        };

        let generation = tokio::time::timeout(timeout, client.generate(prompt, &options))
            .await
            .map_err(|_| {
                ModelError::Timeout(format!("no response within {:.1}s", timeout.as_secs_f64()))
            })??;

        debug!(tokens = generation.token_count, "Generated response");

        Ok(PromptResponse {
            response_id: Uuid::new_v4(),
            model_id: model_id.clone(),
            latency_seconds: generation.latency_seconds,
            time_to_first_token_seconds: generation.time_to_first_token_seconds,
            tokens_per_second: generation.tokens_per_second(),
            token_count: generation.token_count,
            api_cost: generation.api_cost,
            infrastructure_cost: generation.infrastructure_cost,
            total_cost: generation.total_cost(),
            response: generation.text,
        })
    }

    fn with_entry<T>(&self, run_id: RunId, f: impl FnOnce(&RunEntry) -> T) -> Result<T, EvalError> {
        let runs = self.inner.runs.read();
        let entry = runs.get(&run_id).ok_or(RunError::NotFound(run_id))?;
        Ok(f(entry))
    }
}

impl Inner {
    async fn publish(&self, event: RunEvent) {
        if let Err(e) = self.events.publish(event).await {
            warn!(error = %e, "Failed to publish run event");
        }
    }

    /// Resolve dataset, metrics, models and clients for a request.
    async fn prepare(&self, request: &EvaluationRequest) -> Result<RunPlan, ConfigurationError> {
        let dataset = self.datasets.load(&request.dataset_id).await?;
        if dataset.tasks.is_empty() {
            return Err(ConfigurationError::EmptyDataset(request.dataset_id.clone()));
        }
        if let Some(task_id) = dataset.duplicate_task_id() {
            return Err(ConfigurationError::DuplicateTask {
                dataset_id: request.dataset_id.clone(),
                task_id: task_id.clone(),
            });
        }

        let metric_ids = if request.metric_ids.is_empty() {
            // Defaults only cover metrics that have a scorer
            let defaults: Vec<MetricId> = dataset
                .task_type
                .map(|task_type| task_type.default_metrics())
                .unwrap_or_default()
                .into_iter()
                .filter(|id| self.aggregator.registry().contains(id.as_str()))
                .collect();
            if defaults.is_empty() {
                return Err(ConfigurationError::NoMetrics);
            }
            defaults
        } else {
            let requested: BTreeSet<MetricId> = request.metric_ids.iter().cloned().collect();
            self.aggregator.ensure_scorers(&requested)?;
            requested.into_iter().collect()
        };

        let model_ids: BTreeSet<&ModelId> = request.model_ids.iter().collect();
        let mut targets = Vec::with_capacity(model_ids.len());
        for model_id in model_ids {
            let mut descriptor = self.models.descriptor(model_id).await?;
            descriptor.model_id = model_id.clone();
            let client = self.clients.client_for(&descriptor)?;
            targets.push(DispatchTarget::new(descriptor, client));
        }

        Ok(RunPlan {
            dataset,
            metric_ids,
            targets,
        })
    }

    fn mark_running(&self, run_id: RunId, plan: &RunPlan) -> Result<Run, EvalError> {
        let mut runs = self.runs.write();
        let entry = runs.get_mut(&run_id).ok_or(RunError::NotFound(run_id))?;

        entry.run.dataset_name = plan.dataset.name.clone();
        entry.run.metric_ids = plan.metric_ids.iter().cloned().collect();
        entry.run.task_count = plan.dataset.task_count();
        entry.run.transition(RunStatus::Running)?;
        entry.aggregation.set_run(entry.run.clone());
        entry.status_tx.send_replace(RunStatus::Running);

        info!(
            run_id = %run_id,
            tasks = entry.run.task_count,
            models = entry.run.model_ids.len(),
            metrics = entry.run.metric_ids.len(),
            "Run started"
        );
        Ok(entry.run.clone())
    }

    async fn fail_setup(&self, run_id: RunId, error: &ConfigurationError) {
        {
            let mut runs = self.runs.write();
            let Some(entry) = runs.get_mut(&run_id) else {
                return;
            };
            if let Err(e) = entry.run.fail(error.to_string()) {
                warn!(run_id = %run_id, error = %e, "Could not fail run");
            }
            entry.aggregation.set_run(entry.run.clone());
            entry.status_tx.send_replace(entry.run.status);
        }
        self.collector.seal(run_id);

        self.publish(RunEvent::RunFinished {
            run_id,
            status: RunStatus::Failed,
        })
        .await;
    }

    /// Dispatch, score and collect until every pair has terminated.
    async fn drive(self: Arc<Self>, run_id: RunId, plan: RunPlan, control: DispatchControl) {
        let tasks: HashMap<&TaskId, _> = plan
            .dataset
            .tasks
            .iter()
            .map(|task| (&task.task_id, task))
            .collect();

        let mut attempts =
            self.dispatcher
                .dispatch(run_id, &plan.dataset.tasks, &plan.targets, &control);

        while let Some(attempt) = attempts.recv().await {
            let Some(task) = tasks.get(&attempt.task_id) else {
                warn!(run_id = %run_id, task_id = %attempt.task_id, "Attempt for unknown task");
                continue;
            };

            let scored = self.aggregator.score(attempt, task, &plan.metric_ids).await;
            if let Err(e) = self.collector.record(scored.clone()) {
                warn!(run_id = %run_id, error = %e, "Attempt not recorded");
                continue;
            }
            if let Some(entry) = self.runs.write().get_mut(&run_id) {
                entry.aggregation.push(scored);
            }
        }

        self.finalize(run_id, &plan).await;
    }

    /// Seal the log, aggregate, and move the run to its final status.
    async fn finalize(&self, run_id: RunId, plan: &RunPlan) {
        let snapshot = self.collector.snapshot(run_id);
        self.collector.seal(run_id);

        let expected_pairs = plan.dataset.tasks.len() * plan.targets.len();
        let answered: HashSet<&TaskId> = snapshot
            .iter()
            .filter(|s| s.attempt.is_success())
            .map(|s| &s.attempt.task_id)
            .collect();
        let every_task_answered = plan
            .dataset
            .tasks
            .iter()
            .all(|task| answered.contains(&task.task_id));

        let status = {
            let mut runs = self.runs.write();
            let Some(entry) = runs.get_mut(&run_id) else {
                return;
            };

            let summary = aggregate(&entry.run, &snapshot);
            let complete = !entry.run.cancelled
                && snapshot.len() == expected_pairs
                && every_task_answered
                && summary.models_without_successes().next().is_none();
            let status = if complete {
                RunStatus::Completed
            } else {
                RunStatus::Partial
            };

            if let Err(e) = entry.run.transition(status) {
                warn!(run_id = %run_id, error = %e, "Could not finish run");
            }
            entry.aggregation.set_run(entry.run.clone());
            entry.summary = Some(summary);
            entry.run.status
        };

        info!(
            run_id = %run_id,
            status = %status,
            attempts = snapshot.len(),
            "Run finished"
        );
        self.publish(RunEvent::RunFinished { run_id, status }).await;

        // Waiters are released last so they observe the final event
        if let Some(entry) = self.runs.read().get(&run_id) {
            entry.status_tx.send_replace(status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_mode_default_is_final_only() {
        assert_eq!(SummaryMode::default(), SummaryMode::FinalOnly);
    }

    #[test]
    fn test_prompt_response_serializes() {
        let response = PromptResponse {
            response_id: Uuid::nil(),
            model_id: ModelId::from("m"),
            response: "hi".into(),
            latency_seconds: 1.0,
            time_to_first_token_seconds: 0.1,
            tokens_per_second: 2.0,
            token_count: 2,
            api_cost: 0.1,
            infrastructure_cost: 0.0,
            total_cost: 0.1,
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["model_id"], "m");
        assert_eq!(json["total_cost"], 0.1);
    }
}
