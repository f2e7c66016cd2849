//! CLI commands

pub mod datasets;
pub mod generate;
pub mod metrics;
pub mod models;
pub mod run;

use crate::output::{to_json, OutputFormat};
use anyhow::Result;
use llm_eval_application::RunManager;
use serde::Serialize;

/// Context passed to all commands
pub struct CommandContext {
    pub manager: RunManager,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Create a new command context
    pub fn new(manager: RunManager, format: OutputFormat) -> Self {
        Self { manager, format }
    }

    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Print `value` as JSON, or call `table` to render it
    pub fn emit<T: Serialize>(&self, value: &T, table: impl FnOnce(&T) -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => println!("{}", to_json(value)?),
            OutputFormat::Table => println!("{}", table(value)),
        }
        Ok(())
    }
}
