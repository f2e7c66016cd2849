//! Fluent builders for wiring a run manager to in-memory mocks.

use crate::fixtures::{create_test_config, create_test_descriptor};
use crate::mocks::{
    InMemoryDatasetProvider, InMemoryModelCatalog, ScriptedModelClient, StaticClientProvider,
};
use llm_eval_application::ports::MetricScorer;
use llm_eval_application::{RunManager, ScorerRegistry};
use llm_eval_common::EvalConfig;
use llm_eval_domain::{Dataset, ModelDescriptor, ModelId};
use std::collections::HashMap;
use std::sync::Arc;

/// A run manager together with the mocks behind it
pub struct TestEngine {
    pub manager: RunManager,
    pub clients: HashMap<ModelId, Arc<ScriptedModelClient>>,
    pub datasets: Arc<InMemoryDatasetProvider>,
    pub catalog: Arc<InMemoryModelCatalog>,
}

impl TestEngine {
    /// The scripted client registered for `model_id`.
    ///
    /// # Panics
    ///
    /// Panics if no client was registered for the model.
    pub fn client(&self, model_id: &str) -> &Arc<ScriptedModelClient> {
        &self.clients[&ModelId::from(model_id)]
    }
}

/// Builder for [`TestEngine`]
pub struct EngineBuilder {
    config: EvalConfig,
    datasets: Vec<Dataset>,
    models: Vec<(ModelDescriptor, Option<ScriptedModelClient>)>,
    scorers: ScorerRegistry,
}

impl EngineBuilder {
    /// Start from the test configuration and the reference scorers.
    pub fn new() -> Self {
        Self {
            config: create_test_config(),
            datasets: Vec::new(),
            models: Vec::new(),
            scorers: ScorerRegistry::with_reference_scorers(),
        }
    }

    pub fn with_config(mut self, config: EvalConfig) -> Self {
        self.config = config;
        self
    }

    pub fn configure(mut self, f: impl FnOnce(&mut EvalConfig)) -> Self {
        f(&mut self.config);
        self
    }

    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.datasets.push(dataset);
        self
    }

    /// Register a model with a default descriptor served by `client`.
    pub fn with_model(self, model_id: &str, client: ScriptedModelClient) -> Self {
        self.with_descriptor(create_test_descriptor(model_id), client)
    }

    pub fn with_descriptor(mut self, descriptor: ModelDescriptor, client: ScriptedModelClient) -> Self {
        self.models.push((descriptor, Some(client)));
        self
    }

    /// Register a model in the catalog without any client for it.
    pub fn with_unservable_model(mut self, model_id: &str) -> Self {
        self.models.push((create_test_descriptor(model_id), None));
        self
    }

    pub fn with_scorer(mut self, metric_id: &str, scorer: Arc<dyn MetricScorer>) -> Self {
        self.scorers.register(metric_id, scorer);
        self
    }

    pub fn build(self) -> TestEngine {
        let datasets = Arc::new(InMemoryDatasetProvider::new());
        for dataset in self.datasets {
            datasets.insert(dataset);
        }

        let catalog = Arc::new(InMemoryModelCatalog::new());
        let provider = Arc::new(StaticClientProvider::new());
        let mut clients = HashMap::new();
        for (descriptor, client) in self.models {
            if let Some(client) = client {
                let client = Arc::new(client);
                provider.insert(descriptor.model_id.clone(), client.clone());
                clients.insert(descriptor.model_id.clone(), client);
            }
            catalog.insert(descriptor);
        }

        let manager = RunManager::new(
            Arc::new(self.config),
            datasets.clone(),
            catalog.clone(),
            provider,
            Arc::new(self.scorers),
        );

        TestEngine {
            manager,
            clients,
            datasets,
            catalog,
        }
    }
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
