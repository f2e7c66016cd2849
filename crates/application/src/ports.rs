//! Ports to the engine's external collaborators.
//!
//! The engine only talks to models, scorers and configuration sources through
//! these traits; the infrastructure crate and the test mocks implement them.

use async_trait::async_trait;
use llm_eval_domain::{
    ConfigurationError, Dataset, DatasetId, DatasetInfo, Generation, GenerationOptions,
    ModelDescriptor, ModelError, ModelId, ScorerError, Task,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A language model backend.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Generate a completion for `prompt`.
    ///
    /// Implementations report their own latency, time to first token and costs.
    /// Transient failures must be reported with a transient [`ModelError`] variant
    /// so the dispatcher can retry them.
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, ModelError>;
}

/// Scores one response against the task it answers.
#[async_trait]
pub trait MetricScorer: Send + Sync {
    async fn score(&self, response: &str, task: &Task) -> Result<f64, ScorerError>;

    /// Get the scorer type name.
    fn name(&self) -> &'static str;
}

/// Source of datasets
#[async_trait]
pub trait DatasetProvider: Send + Sync {
    async fn load(&self, dataset_id: &DatasetId) -> Result<Dataset, ConfigurationError>;
    async fn list(&self) -> Result<Vec<DatasetInfo>, ConfigurationError>;
}

/// Source of model descriptors
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn descriptors(&self) -> Result<BTreeMap<ModelId, ModelDescriptor>, ConfigurationError>;

    async fn descriptor(&self, model_id: &ModelId) -> Result<ModelDescriptor, ConfigurationError> {
        self.descriptors()
            .await?
            .remove(model_id)
            .ok_or_else(|| ConfigurationError::ModelNotFound(model_id.clone()))
    }
}

/// Builds a client for a model descriptor.
pub trait ModelClientProvider: Send + Sync {
    fn client_for(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<Arc<dyn ModelClient>, ConfigurationError>;
}
