//! Testing utilities for the LLM evaluation engine
//!
//! This crate provides:
//! - Fixtures for tasks, datasets, model descriptors and configuration
//! - Scripted model clients that record how they were called
//! - In-memory dataset, model and client providers
//! - A builder that wires a [`RunManager`](llm_eval_application::RunManager) to the mocks
//!
//! # Examples
//!
//! ```no_run
//! use llm_eval_testing::*;
//! use std::time::Duration;
//!
//! # async fn example() {
//! let engine = EngineBuilder::new()
//!     .with_dataset(create_test_dataset("qa", 5))
//!     .with_model("model-a", ScriptedModelClient::new().with_latency(Duration::from_millis(50)))
//!     .build();
//!
//! let run_id = engine
//!     .manager
//!     .start_evaluation(create_test_request("qa", ["model-a"], ["exact_match"]))
//!     .await
//!     .unwrap();
//! # let _ = run_id;
//! # }
//! ```

pub mod builders;
pub mod fixtures;
pub mod mocks;

// Re-export commonly used types
pub use builders::*;
pub use fixtures::*;
pub use mocks::*;

// Re-export testing dependencies for convenience
pub use proptest;
pub use wiremock;
