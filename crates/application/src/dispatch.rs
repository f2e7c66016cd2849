//! Task dispatcher.
//!
//! Fans every `(task, model)` pair of a run out to the model clients, bounded by a
//! global in-flight limit and a per-model limit. Each pair runs its executions
//! strictly one after another: transient failures are retried with exponential
//! backoff, permanent failures end the pair immediately. The terminal attempt of
//! each pair is sent down the returned channel as soon as it is known.

use crate::events::{EventPublisher, RunEvent};
use crate::ports::ModelClient;
use chrono::{DateTime, Utc};
use llm_eval_common::{EvalConfig, ExponentialBackoff, RetryConfig};
use llm_eval_domain::{
    Attempt, AttemptError, GenerationOptions, ModelDescriptor, ModelError, ModelId,
    RunId, Task,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Concurrency and timeout bounds for a dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchLimits {
    /// Maximum in-flight calls across all models
    pub global_concurrency: usize,
    /// Maximum in-flight calls per model, unless the descriptor overrides it
    pub per_model_concurrency: usize,
    /// Upper bound on a single model call
    pub request_timeout: Duration,
}

impl Default for DispatchLimits {
    fn default() -> Self {
        Self {
            global_concurrency: 10,
            per_model_concurrency: 3,
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl DispatchLimits {
    pub fn from_config(config: &EvalConfig) -> Self {
        Self {
            global_concurrency: config.dispatch.global_concurrency,
            per_model_concurrency: config.dispatch.per_model_concurrency,
            request_timeout: config.request_timeout(),
        }
    }

    /// Effective in-flight limit for one model.
    pub fn model_limit(&self, descriptor: &ModelDescriptor) -> usize {
        descriptor
            .max_concurrency
            .unwrap_or(self.per_model_concurrency)
            .max(1)
    }
}

/// A model to dispatch to, with the client that serves it
#[derive(Clone)]
pub struct DispatchTarget {
    pub descriptor: ModelDescriptor,
    pub client: Arc<dyn ModelClient>,
}

impl DispatchTarget {
    pub fn new(descriptor: ModelDescriptor, client: Arc<dyn ModelClient>) -> Self {
        Self { descriptor, client }
    }

    pub fn model_id(&self) -> &ModelId {
        &self.descriptor.model_id
    }
}

impl std::fmt::Debug for DispatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchTarget")
            .field("model_id", &self.descriptor.model_id)
            .finish_non_exhaustive()
    }
}

/// Cancellation handles shared by a run and its dispatch.
///
/// Cancelling stops new executions from starting; pairs that never ran report
/// nothing. Aborting additionally interrupts in-flight calls, which then finish
/// as failed with a `cancelled` error.
#[derive(Debug, Clone, Default)]
pub struct DispatchControl {
    stop: CancellationToken,
    abort: CancellationToken,
}

impl DispatchControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.stop.cancel();
    }

    pub fn abort(&self) {
        self.stop.cancel();
        self.abort.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_cancelled()
    }
}

/// Schedules `(task, model)` pairs onto model clients.
///
/// The global and per-model permits live on the dispatcher, so the limits hold
/// across every run it serves, not just within one.
pub struct Dispatcher {
    limits: DispatchLimits,
    retry: RetryConfig,
    options: GenerationOptions,
    events: Arc<dyn EventPublisher>,
    global_permits: Arc<Semaphore>,
    model_permits: Mutex<HashMap<ModelId, Arc<Semaphore>>>,
}

impl Dispatcher {
    pub fn new(limits: DispatchLimits, retry: RetryConfig, events: Arc<dyn EventPublisher>) -> Self {
        let global_permits = Arc::new(Semaphore::new(limits.global_concurrency.max(1)));
        Self {
            limits,
            retry,
            options: GenerationOptions::default(),
            events,
            global_permits,
            model_permits: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &EvalConfig, events: Arc<dyn EventPublisher>) -> Self {
        Self::new(DispatchLimits::from_config(config), config.retry_config(), events)
    }

    /// Set the generation options sent with every call. The timeout is always
    /// replaced by the dispatch request timeout.
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn limits(&self) -> &DispatchLimits {
        &self.limits
    }

    /// Permits of one model, created on first use and sized from the first
    /// descriptor seen for it.
    fn permits_for(&self, descriptor: &ModelDescriptor) -> Arc<Semaphore> {
        self.model_permits
            .lock()
            .entry(descriptor.model_id.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(self.limits.model_limit(descriptor))))
            .clone()
    }

    /// Dispatch `tasks × targets` and stream terminal attempts as they finish.
    ///
    /// The channel closes once every pair has terminated. Must be called from
    /// within a tokio runtime.
    #[instrument(skip_all, fields(run_id = %run_id, tasks = tasks.len(), models = targets.len()))]
    pub fn dispatch(
        &self,
        run_id: RunId,
        tasks: &[Task],
        targets: &[DispatchTarget],
        control: &DispatchControl,
    ) -> mpsc::UnboundedReceiver<Attempt> {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut options = self.options.clone();
        options.timeout = self.limits.request_timeout;

        let ctx = Arc::new(PairContext {
            run_id,
            global_permits: self.global_permits.clone(),
            retry: self.retry.clone(),
            options,
            request_timeout: self.limits.request_timeout,
            events: self.events.clone(),
            control: control.clone(),
        });

        let models: Vec<(DispatchTarget, Arc<Semaphore>)> = targets
            .iter()
            .map(|target| (target.clone(), self.permits_for(&target.descriptor)))
            .collect();

        // Tasks outer, models inner: permits are granted in FIFO order, so early
        // tasks reach every model before later ones.
        for task in tasks {
            let task = Arc::new(task.clone());
            for (target, model_permits) in &models {
                let pair = Pair {
                    task: task.clone(),
                    model_id: target.descriptor.model_id.clone(),
                    client: target.client.clone(),
                    model_permits: model_permits.clone(),
                };
                let ctx = ctx.clone();
                let sender = sender.clone();

                tokio::spawn(async move {
                    if let Some(attempt) = run_pair(&ctx, pair).await {
                        ctx.publish(RunEvent::AttemptFinished {
                            run_id: attempt.run_id,
                            task_id: attempt.task_id.clone(),
                            model_id: attempt.model_id.clone(),
                            attempt_number: attempt.attempt_number,
                            status: attempt.status,
                        })
                        .await;

                        if sender.send(attempt).is_err() {
                            debug!("Attempt receiver dropped");
                        }
                    }
                });
            }
        }

        info!(pairs = tasks.len() * models.len(), "Dispatched run");
        receiver
    }
}

struct PairContext {
    run_id: RunId,
    global_permits: Arc<Semaphore>,
    retry: RetryConfig,
    options: GenerationOptions,
    request_timeout: Duration,
    events: Arc<dyn EventPublisher>,
    control: DispatchControl,
}

impl PairContext {
    async fn publish(&self, event: RunEvent) {
        if let Err(e) = self.events.publish(event).await {
            warn!(error = %e, "Failed to publish run event");
        }
    }

    fn cancelled(
        &self,
        pair: &Pair,
        executions: u32,
        retry_errors: Vec<AttemptError>,
        latency_seconds: f64,
        started_at: DateTime<Utc>,
    ) -> Attempt {
        Attempt::failed(
            self.run_id,
            pair.task.task_id.clone(),
            pair.model_id.clone(),
            executions,
            AttemptError::cancelled("run cancelled"),
            latency_seconds,
            started_at,
        )
        .with_retry_errors(retry_errors)
    }
}

struct Pair {
    task: Arc<Task>,
    model_id: ModelId,
    client: Arc<dyn ModelClient>,
    model_permits: Arc<Semaphore>,
}

/// Model permit first, then global, so a pair never holds a global slot while
/// waiting on its own model.
async fn acquire(
    model_permits: &Arc<Semaphore>,
    global_permits: &Arc<Semaphore>,
) -> Option<(OwnedSemaphorePermit, OwnedSemaphorePermit)> {
    let model = model_permits.clone().acquire_owned().await.ok()?;
    let global = global_permits.clone().acquire_owned().await.ok()?;
    Some((model, global))
}

/// Run every execution of one pair and return its terminal attempt, or `None`
/// if the run was cancelled before the pair started.
async fn run_pair(ctx: &PairContext, pair: Pair) -> Option<Attempt> {
    let mut first_execution: Option<DateTime<Utc>> = None;
    let prompt = pair.task.render_prompt();
    let mut backoff = ExponentialBackoff::new(ctx.retry.clone());
    let mut retry_errors: Vec<AttemptError> = Vec::new();
    let mut executions: u32 = 0;

    loop {
        let permits = tokio::select! {
            biased;
            _ = ctx.control.stop.cancelled() => None,
            permits = acquire(&pair.model_permits, &ctx.global_permits) => permits,
        };

        let Some(permits) = permits else {
            let Some(started_at) = first_execution else {
                debug!(task_id = %pair.task.task_id, model_id = %pair.model_id, "Pair skipped after cancel");
                return None;
            };
            return Some(ctx.cancelled(&pair, executions, retry_errors, 0.0, started_at));
        };
        // Queueing behind the permits is not part of the attempt
        let started_at = *first_execution.get_or_insert_with(Utc::now);

        let attempt_number = executions + 1;
        ctx.publish(RunEvent::AttemptStarted {
            run_id: ctx.run_id,
            task_id: pair.task.task_id.clone(),
            model_id: pair.model_id.clone(),
            attempt_number,
        })
        .await;

        let call_started = Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = ctx.control.abort.cancelled() => None,
            result = tokio::time::timeout(
                ctx.request_timeout,
                pair.client.generate(&prompt, &ctx.options),
            ) => Some(result.unwrap_or_else(|_| {
                Err(ModelError::Timeout(format!(
                    "no response within {:.1}s",
                    ctx.request_timeout.as_secs_f64()
                )))
            })),
        };
        let latency_seconds = call_started.elapsed().as_secs_f64();
        drop(permits);
        executions = attempt_number;

        let Some(result) = outcome else {
            warn!(task_id = %pair.task.task_id, model_id = %pair.model_id, "In-flight call aborted");
            return Some(ctx.cancelled(&pair, executions, retry_errors, latency_seconds, started_at));
        };

        let error = match result {
            Ok(generation) => {
                return Some(
                    Attempt::succeeded(
                        ctx.run_id,
                        pair.task.task_id.clone(),
                        pair.model_id.clone(),
                        executions,
                        generation,
                        started_at,
                    )
                    .with_retry_errors(retry_errors),
                );
            }
            Err(error) => error,
        };

        backoff.next_attempt();
        if !error.is_retryable() || !backoff.has_attempts_remaining() {
            debug!(
                task_id = %pair.task.task_id,
                model_id = %pair.model_id,
                executions,
                error = %error,
                "Attempt failed"
            );
            return Some(
                Attempt::failed(
                    ctx.run_id,
                    pair.task.task_id.clone(),
                    pair.model_id.clone(),
                    executions,
                    AttemptError::from(&error),
                    latency_seconds,
                    started_at,
                )
                .with_retry_errors(retry_errors),
            );
        }

        retry_errors.push(AttemptError::from(&error));
        if ctx.control.is_cancelled() {
            return Some(ctx.cancelled(&pair, executions, retry_errors, latency_seconds, started_at));
        }

        let delay = backoff.delay();
        debug!(
            task_id = %pair.task.task_id,
            model_id = %pair.model_id,
            attempt = executions,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying after transient error"
        );
        ctx.publish(RunEvent::AttemptRetrying {
            run_id: ctx.run_id,
            task_id: pair.task.task_id.clone(),
            model_id: pair.model_id.clone(),
            attempt_number: executions,
            error: AttemptError::from(&error),
            delay_ms: delay.as_millis() as u64,
        })
        .await;

        tokio::select! {
            biased;
            _ = ctx.control.stop.cancelled() => {
                return Some(ctx.cancelled(&pair, executions, retry_errors, latency_seconds, started_at));
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
