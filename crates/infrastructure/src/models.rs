//! Model catalog backed by `models_config.json`.
//!
//! The file is an object keyed by model id:
//!
//! ```json
//! {
//!   "gpt-4o": {
//!     "type": "hosted_api",
//!     "description": "GPT-4o",
//!     "api_key_env": "OPENAI_API_KEY",
//!     "prompt_price_per_1k": 0.005,
//!     "completion_price_per_1k": 0.015
//!   },
//!   "llama3": { "type": "local", "model_name": "llama3:8b" }
//! }
//! ```

use async_trait::async_trait;
use llm_eval_application::ports::ModelCatalog;
use llm_eval_domain::{ConfigurationError, ModelDescriptor, ModelId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Reads model descriptors from a JSON file on every lookup, so edits are
/// picked up by the next run.
#[derive(Debug, Clone)]
pub struct JsonModelCatalog {
    path: PathBuf,
}

impl JsonModelCatalog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a models file. Each descriptor's id is taken from its key.
    pub fn parse(contents: &str) -> Result<BTreeMap<ModelId, ModelDescriptor>, serde_json::Error> {
        let raw: BTreeMap<ModelId, ModelDescriptor> = serde_json::from_str(contents)?;
        Ok(raw
            .into_iter()
            .map(|(model_id, mut descriptor)| {
                descriptor.model_id = model_id.clone();
                (model_id, descriptor)
            })
            .collect())
    }
}

#[async_trait]
impl ModelCatalog for JsonModelCatalog {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn descriptors(&self) -> Result<BTreeMap<ModelId, ModelDescriptor>, ConfigurationError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ConfigurationError::Source(format!("{}: {}", self.path.display(), e)))?;

        let descriptors = Self::parse(&contents)
            .map_err(|e| ConfigurationError::Source(format!("{}: {}", self.path.display(), e)))?;

        debug!(models = descriptors.len(), "Loaded model catalog");
        Ok(descriptors)
    }
}
