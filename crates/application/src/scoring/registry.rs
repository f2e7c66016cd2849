use crate::ports::MetricScorer;
use crate::scoring::reference::{
    ConcisenessScorer, ContainsScorer, ExactMatchScorer, LengthScorer, TokenF1Scorer,
};
use llm_eval_domain::{ConfigurationError, MetricId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Maps metric ids to the scorers that compute them.
#[derive(Clone, Default)]
pub struct ScorerRegistry {
    scorers: HashMap<MetricId, Arc<dyn MetricScorer>>,
}

impl ScorerRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the reference scorers registered under their
    /// catalog ids: `exact_match`, `contains`, `f1`, `conciseness` and `length`.
    pub fn with_reference_scorers() -> Self {
        let mut registry = Self::new();
        registry.register("exact_match", Arc::new(ExactMatchScorer::default()));
        registry.register("contains", Arc::new(ContainsScorer));
        registry.register("f1", Arc::new(TokenF1Scorer));
        registry.register("conciseness", Arc::new(ConcisenessScorer::default()));
        registry.register("length", Arc::new(LengthScorer));
        registry
    }

    /// Register a scorer, replacing any previous scorer for the same metric
    pub fn register(&mut self, metric_id: impl Into<MetricId>, scorer: Arc<dyn MetricScorer>) {
        self.scorers.insert(metric_id.into(), scorer);
    }

    /// Get a scorer by metric id
    pub fn get(&self, metric_id: &str) -> Option<Arc<dyn MetricScorer>> {
        self.scorers.get(metric_id).cloned()
    }

    pub fn contains(&self, metric_id: &str) -> bool {
        self.scorers.contains_key(metric_id)
    }

    /// Resolve every metric id to its scorer, failing on the first unknown id.
    pub fn resolve<'a>(
        &self,
        metric_ids: impl IntoIterator<Item = &'a MetricId>,
    ) -> Result<Vec<(MetricId, Arc<dyn MetricScorer>)>, ConfigurationError> {
        metric_ids
            .into_iter()
            .map(|id| {
                self.get(id.as_str())
                    .map(|scorer| (id.clone(), scorer))
                    .ok_or_else(|| ConfigurationError::MetricNotFound(id.clone()))
            })
            .collect()
    }

    /// Registered metric ids, sorted
    pub fn metric_ids(&self) -> Vec<MetricId> {
        let mut ids: Vec<MetricId> = self.scorers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.scorers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scorers.is_empty()
    }
}

impl fmt::Debug for ScorerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScorerRegistry")
            .field("metrics", &self.metric_ids())
            .finish()
    }
}

/// Builder for [`ScorerRegistry`]
#[derive(Default)]
pub struct ScorerRegistryBuilder {
    registry: ScorerRegistry,
}

impl ScorerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the reference scorers
    pub fn with_reference_scorers(mut self) -> Self {
        for (id, scorer) in ScorerRegistry::with_reference_scorers().scorers {
            self.registry.scorers.insert(id, scorer);
        }
        self
    }

    pub fn scorer(mut self, metric_id: impl Into<MetricId>, scorer: Arc<dyn MetricScorer>) -> Self {
        self.registry.register(metric_id, scorer);
        self
    }

    pub fn build(self) -> ScorerRegistry {
        self.registry
    }
}
