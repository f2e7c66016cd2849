//! LLM evaluation CLI library
//!
//! Commands, output formatting and progress reporting for the `llm-eval`
//! binary. Commands take a [`commands::CommandContext`] wrapping a
//! [`llm_eval_application::RunManager`], so they can be driven against any
//! set of providers.

pub mod commands;
pub mod output;
pub mod progress;

pub use commands::CommandContext;
pub use output::{OutputFormat, TableFormatter};

/// Re-export common types
pub use anyhow::{Context, Result};
