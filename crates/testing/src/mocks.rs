//! Mock implementations of the engine's ports.
//!
//! Everything here is in-memory. Model clients simulate latency with
//! `tokio::time::sleep`, so tests running on a paused clock stay deterministic.

use async_trait::async_trait;
use llm_eval_application::ports::{
    DatasetProvider, MetricScorer, ModelCatalog, ModelClient, ModelClientProvider,
};
use llm_eval_domain::{
    ConfigurationError, Dataset, DatasetId, DatasetInfo, Generation, GenerationOptions,
    ModelDescriptor, ModelError, ModelId, Pricing, ScorerError, Task,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Tracks how many calls are in flight at once and the highest count seen.
#[derive(Debug, Default)]
pub struct ConcurrencyProbe {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Count a call as in flight until the returned guard is dropped.
    pub fn enter(self: &Arc<Self>) -> ProbeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        ProbeGuard {
            probe: self.clone(),
        }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

/// Decrements its probe when dropped, including when the call is cancelled.
#[derive(Debug)]
pub struct ProbeGuard {
    probe: Arc<ConcurrencyProbe>,
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.probe.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// What a scripted client answers with
#[derive(Debug, Clone)]
pub enum ResponseMode {
    /// The same text for every prompt
    Fixed(String),
    /// The prompt itself
    Echo,
    /// A text looked up by prompt, falling back to the default
    ByPrompt {
        responses: HashMap<String, String>,
        default: String,
    },
}

/// Model client driven by a script.
///
/// Each call sleeps for the configured latency, then either pops the next
/// scripted error for its prompt, fails with the permanent error if one is
/// set, or succeeds. Every prompt is tracked separately so tests can check that
/// a `(task, model)` pair never runs twice at once.
pub struct ScriptedModelClient {
    latency: Duration,
    time_to_first_token: Duration,
    response: ResponseMode,
    pricing: Pricing,
    always_fail: Option<ModelError>,
    hang: bool,
    failures: Mutex<HashMap<String, VecDeque<ModelError>>>,
    pending_failures: Mutex<Vec<ModelError>>,
    calls: Mutex<HashMap<String, usize>>,
    in_flight_by_prompt: Mutex<HashMap<String, usize>>,
    overlapping_calls: AtomicUsize,
    probe: Arc<ConcurrencyProbe>,
    shared_probe: Option<Arc<ConcurrencyProbe>>,
}

impl ScriptedModelClient {
    pub fn new() -> Self {
        Self {
            latency: Duration::from_millis(100),
            time_to_first_token: Duration::from_millis(10),
            response: ResponseMode::Fixed("mock response".to_string()),
            pricing: Pricing::default(),
            always_fail: None,
            hang: false,
            failures: Mutex::new(HashMap::new()),
            pending_failures: Mutex::new(Vec::new()),
            calls: Mutex::new(HashMap::new()),
            in_flight_by_prompt: Mutex::new(HashMap::new()),
            overlapping_calls: AtomicUsize::new(0),
            probe: ConcurrencyProbe::new(),
            shared_probe: None,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_time_to_first_token(mut self, ttft: Duration) -> Self {
        self.time_to_first_token = ttft;
        self
    }

    pub fn with_response(mut self, text: impl Into<String>) -> Self {
        self.response = ResponseMode::Fixed(text.into());
        self
    }

    pub fn echo(mut self) -> Self {
        self.response = ResponseMode::Echo;
        self
    }

    pub fn with_response_for(mut self, prompt: impl Into<String>, text: impl Into<String>) -> Self {
        let mut responses = match self.response {
            ResponseMode::ByPrompt { responses, .. } => responses,
            _ => HashMap::new(),
        };
        responses.insert(prompt.into(), text.into());
        self.response = ResponseMode::ByPrompt {
            responses,
            default: "mock response".to_string(),
        };
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    /// Fail every call with `error`.
    pub fn always_failing(mut self, error: ModelError) -> Self {
        self.always_fail = Some(error);
        self
    }

    /// Never answer; calls only end when they are timed out or aborted.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Fail the first calls for `prompt` with `errors`, in order.
    pub fn failing_first(self, prompt: impl Into<String>, errors: Vec<ModelError>) -> Self {
        self.failures
            .lock()
            .entry(prompt.into())
            .or_default()
            .extend(errors);
        self
    }

    /// Fail the first calls for every prompt with `errors`, in order.
    pub fn failing_first_for_all(self, errors: Vec<ModelError>) -> Self {
        self.pending_failures.lock().extend(errors);
        self
    }

    /// Also count calls in `probe`, typically shared by several clients.
    pub fn with_shared_probe(mut self, probe: Arc<ConcurrencyProbe>) -> Self {
        self.shared_probe = Some(probe);
        self
    }

    /// Total calls received
    pub fn call_count(&self) -> usize {
        self.calls.lock().values().sum()
    }

    /// Calls received for one prompt
    pub fn calls_for(&self, prompt: &str) -> usize {
        self.calls.lock().get(prompt).copied().unwrap_or(0)
    }

    /// Highest number of calls this client had in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.probe.max()
    }

    pub fn in_flight(&self) -> usize {
        self.probe.current()
    }

    /// Calls that started while another call for the same prompt was in flight
    pub fn overlapping_calls(&self) -> usize {
        self.overlapping_calls.load(Ordering::SeqCst)
    }

    fn next_failure(&self, prompt: &str) -> Option<ModelError> {
        let mut failures = self.failures.lock();
        let queue = failures.entry(prompt.to_string()).or_insert_with(|| {
            self.pending_failures.lock().iter().cloned().collect()
        });
        queue.pop_front().or_else(|| self.always_fail.clone())
    }

    fn response_for(&self, prompt: &str) -> String {
        match &self.response {
            ResponseMode::Fixed(text) => text.clone(),
            ResponseMode::Echo => prompt.to_string(),
            ResponseMode::ByPrompt { responses, default } => {
                responses.get(prompt).unwrap_or(default).clone()
            }
        }
    }
}

impl Default for ScriptedModelClient {
    fn default() -> Self {
        Self::new()
    }
}

struct PromptGuard<'a> {
    client: &'a ScriptedModelClient,
    prompt: String,
}

impl Drop for PromptGuard<'_> {
    fn drop(&mut self) {
        if let Some(count) = self.client.in_flight_by_prompt.lock().get_mut(&self.prompt) {
            *count = count.saturating_sub(1);
        }
    }
}

#[async_trait]
impl ModelClient for ScriptedModelClient {
    async fn generate(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<Generation, ModelError> {
        *self.calls.lock().entry(prompt.to_string()).or_default() += 1;

        let _probe = self.probe.enter();
        let _shared = self.shared_probe.as_ref().map(|probe| probe.enter());
        let _prompt_guard = {
            let mut in_flight = self.in_flight_by_prompt.lock();
            let count = in_flight.entry(prompt.to_string()).or_default();
            if *count > 0 {
                self.overlapping_calls.fetch_add(1, Ordering::SeqCst);
            }
            *count += 1;
            PromptGuard {
                client: self,
                prompt: prompt.to_string(),
            }
        };

        if self.hang {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(self.latency).await;

        if let Some(error) = self.next_failure(prompt) {
            return Err(error);
        }

        let text = self.response_for(prompt);
        let token_count = text.split_whitespace().count() as u64;
        let prompt_tokens = prompt.split_whitespace().count() as u64;

        Ok(Generation {
            token_count,
            prompt_tokens,
            time_to_first_token_seconds: self.time_to_first_token.as_secs_f64(),
            latency_seconds: self.latency.as_secs_f64(),
            api_cost: self.pricing.api_cost(prompt_tokens, token_count),
            infrastructure_cost: self.pricing.infrastructure_cost(prompt_tokens, token_count),
            text,
        })
    }
}

/// Scorer that always returns the same value
#[derive(Debug, Clone)]
pub struct FixedScorer(pub f64);

#[async_trait]
impl MetricScorer for FixedScorer {
    async fn score(&self, _response: &str, _task: &Task) -> Result<f64, ScorerError> {
        Ok(self.0)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Scorer that always fails
#[derive(Debug, Clone, Default)]
pub struct FailingScorer;

#[async_trait]
impl MetricScorer for FailingScorer {
    async fn score(&self, _response: &str, _task: &Task) -> Result<f64, ScorerError> {
        Err(ScorerError::Failed("scorer unavailable".to_string()))
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

/// Dataset provider backed by a map
#[derive(Debug, Default)]
pub struct InMemoryDatasetProvider {
    datasets: RwLock<BTreeMap<DatasetId, Dataset>>,
}

impl InMemoryDatasetProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dataset(self, dataset: Dataset) -> Self {
        self.insert(dataset);
        self
    }

    pub fn insert(&self, dataset: Dataset) {
        self.datasets.write().insert(dataset.id.clone(), dataset);
    }
}

#[async_trait]
impl DatasetProvider for InMemoryDatasetProvider {
    async fn load(&self, dataset_id: &DatasetId) -> Result<Dataset, ConfigurationError> {
        self.datasets
            .read()
            .get(dataset_id)
            .cloned()
            .ok_or_else(|| ConfigurationError::DatasetNotFound(dataset_id.clone()))
    }

    async fn list(&self) -> Result<Vec<DatasetInfo>, ConfigurationError> {
        Ok(self
            .datasets
            .read()
            .values()
            .map(|dataset| DatasetInfo {
                id: dataset.id.clone(),
                name: dataset.name.clone(),
                task_count: dataset.task_count(),
                path: None,
            })
            .collect())
    }
}

/// Model catalog backed by a map
#[derive(Debug, Default)]
pub struct InMemoryModelCatalog {
    descriptors: RwLock<BTreeMap<ModelId, ModelDescriptor>>,
}

impl InMemoryModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_descriptor(self, descriptor: ModelDescriptor) -> Self {
        self.insert(descriptor);
        self
    }

    pub fn insert(&self, descriptor: ModelDescriptor) {
        self.descriptors
            .write()
            .insert(descriptor.model_id.clone(), descriptor);
    }
}

#[async_trait]
impl ModelCatalog for InMemoryModelCatalog {
    async fn descriptors(&self) -> Result<BTreeMap<ModelId, ModelDescriptor>, ConfigurationError> {
        Ok(self.descriptors.read().clone())
    }
}

/// Hands out pre-built clients by model id
#[derive(Default)]
pub struct StaticClientProvider {
    clients: RwLock<HashMap<ModelId, Arc<dyn ModelClient>>>,
}

impl StaticClientProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, model_id: impl Into<ModelId>, client: Arc<dyn ModelClient>) {
        self.clients.write().insert(model_id.into(), client);
    }
}

impl ModelClientProvider for StaticClientProvider {
    fn client_for(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<Arc<dyn ModelClient>, ConfigurationError> {
        self.clients
            .read()
            .get(&descriptor.model_id)
            .cloned()
            .ok_or_else(|| ConfigurationError::Backend {
                model_id: descriptor.model_id.clone(),
                message: "no client registered".to_string(),
            })
    }
}
