//! Application layer for the LLM evaluation engine
//!
//! This crate orchestrates evaluation runs on top of the domain model.
//!
//! ## Architecture
//!
//! The application layer sits between the domain and infrastructure layers.
//! It talks to models, datasets and scorers only through the traits in
//! [`ports`], which the infrastructure crate implements.
//!
//! ## Modules
//!
//! - `run_manager` - Run lifecycle: start, status, cancel, summaries
//! - `dispatch` - Bounded-concurrency fan-out of tasks to models, with retries
//! - `collector` - Append-only per-run result log
//! - `aggregator` - Scoring and order-independent summary aggregation
//! - `scoring` - Scorer registry and reference scorers
//! - `events` - Run progress events
//! - `ports` - Traits implemented by backends and configuration sources

pub mod aggregator;
pub mod collector;
pub mod dispatch;
pub mod events;
pub mod ports;
pub mod run_manager;
pub mod scoring;

// Re-export commonly used types
pub use aggregator::{aggregate, Aggregation, MetricsAggregator};
pub use collector::ResultCollector;
pub use dispatch::{DispatchControl, DispatchLimits, DispatchTarget, Dispatcher};
pub use events::{BroadcastEventPublisher, EventPublisher, NoOpEventPublisher, RunEvent};
pub use ports::{DatasetProvider, MetricScorer, ModelCatalog, ModelClient, ModelClientProvider};
pub use run_manager::{PromptResponse, RunManager, SummaryMode};
pub use scoring::{ScorerRegistry, ScorerRegistryBuilder};
