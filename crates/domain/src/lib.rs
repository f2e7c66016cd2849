//! LLM Eval Domain Types
//!
//! Core domain model for the evaluation engine: the tasks being run, the models
//! they run against, the attempts that record each outcome, and the summaries
//! aggregated from them.
//!
//! ## Modules
//!
//! - **identifiers**: Run ids (random UUIDs) and configured-name keys
//! - **task**: Tasks, datasets and task types
//! - **model**: Model descriptors, pricing and the generation contract
//! - **metric**: Metric catalog and task-type defaults
//! - **attempt**: Attempts and scored attempts
//! - **run**: Runs, their status machine and evaluation requests
//! - **summary**: Per-model and per-metric summaries
//! - **errors**: Error taxonomy
//!
//! ## Usage
//!
//! ```rust
//! use llm_eval_domain::{run::RunStatus, identifiers::RunId};
//!
//! let id = RunId::new();
//! assert!(RunStatus::Pending.can_transition_to(RunStatus::Running));
//! assert!(!RunStatus::Completed.can_transition_to(RunStatus::Running));
//! # let _ = id;
//! ```

#![warn(clippy::all)]

pub mod attempt;
pub mod errors;
pub mod identifiers;
pub mod metric;
pub mod model;
pub mod run;
pub mod summary;
pub mod task;

// Re-export commonly used types
pub use attempt::{Attempt, AttemptError, AttemptKey, AttemptStatus, ScoredAttempt};
pub use errors::{
    CollectorError, ConfigurationError, ErrorCategory, EvalError, EvalResult, ModelError,
    RunError, ScorerError,
};
pub use identifiers::*;
pub use metric::{find_metric, metric_catalog, MetricDefinition};
pub use model::{Generation, GenerationOptions, ModelDescriptor, ModelType, Pricing};
pub use run::{EvaluationRequest, Run, RunOverview, RunStatus};
pub use summary::{MetricSummary, ModelSummary, Summary};
pub use task::{Dataset, DatasetInfo, Task, TaskType};
