//! Infrastructure layer for the LLM evaluation engine
//!
//! This crate provides implementations of the application ports:
//! - Datasets read from JSON files (`FileDatasetProvider`)
//! - Model descriptors read from `models_config.json` (`JsonModelCatalog`)
//! - OpenAI-compatible HTTP model clients and the factory that builds them
//!
//! ## Usage
//!
//! ```rust,no_run
//! use llm_eval_application::ScorerRegistry;
//! use llm_eval_common::EvalConfig;
//! use llm_eval_infrastructure::build_run_manager;
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(EvalConfig::load()?);
//! let manager = build_run_manager(config, Arc::new(ScorerRegistry::with_reference_scorers()))?;
//! # let _ = manager;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod datasets;
pub mod models;

pub use backends::{BackendFactory, OpenAiCompatibleClient};
pub use datasets::FileDatasetProvider;
pub use models::JsonModelCatalog;

use llm_eval_application::{RunManager, ScorerRegistry};
use llm_eval_common::EvalConfig;
use llm_eval_domain::ConfigurationError;
use std::sync::Arc;
use tracing::info;

/// Wire a run manager to the file providers and HTTP backends named by `config`.
pub fn build_run_manager(
    config: Arc<EvalConfig>,
    scorers: Arc<ScorerRegistry>,
) -> Result<RunManager, ConfigurationError> {
    let datasets = Arc::new(FileDatasetProvider::new(config.paths.datasets_dir.clone()));
    let models = Arc::new(JsonModelCatalog::new(config.paths.models_config.clone()));
    let backends = Arc::new(BackendFactory::new()?);

    info!(
        datasets_dir = %config.paths.datasets_dir.display(),
        models_config = %config.paths.models_config.display(),
        scorers = scorers.len(),
        "Run manager ready"
    );

    Ok(RunManager::new(config, datasets, models, backends, scorers))
}
