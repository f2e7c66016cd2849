//! Common utilities shared by the evaluation engine crates.
//!
//! This crate provides:
//! - Configuration management (`EvalConfig`)
//! - Telemetry setup
//! - Retry logic with exponential backoff and jitter

pub mod config;
pub mod retry;
pub mod telemetry;

// Re-export commonly used types
pub use config::{
    CancellationConfig, DispatchConfig, EvalConfig, PathsConfig, RetrySettings, TelemetryConfig,
};
pub use retry::{ExponentialBackoff, RetryConfig};
pub use telemetry::init_tracing;

/// Common error type used throughout the crate
pub type Result<T> = std::result::Result<T, anyhow::Error>;
