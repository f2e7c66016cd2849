//! Output formatting for CLI

use anyhow::Result;
use serde::{Deserialize, Serialize};

mod table;

pub use table::{summary_tables, TableFormatter};

/// Output format enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// Table output (default)
    #[default]
    Table,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Table => write!(f, "table"),
        }
    }
}

/// Format a value as pretty JSON
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Scores and costs are printed with a fixed number of decimals
pub fn fmt_float(value: f64, decimals: usize) -> String {
    format!("{value:.decimals$}")
}

/// Color helpers
pub mod colors {
    use colored::*;
    use llm_eval_domain::RunStatus;

    pub fn success(s: &str) -> ColoredString {
        s.green()
    }

    pub fn error(s: &str) -> ColoredString {
        s.red()
    }

    pub fn warning(s: &str) -> ColoredString {
        s.yellow()
    }

    pub fn info(s: &str) -> ColoredString {
        s.blue()
    }

    pub fn bold(s: &str) -> ColoredString {
        s.bold()
    }

    pub fn status(status: RunStatus) -> ColoredString {
        match status {
            RunStatus::Completed => success(status.as_str()),
            RunStatus::Partial => warning(status.as_str()),
            RunStatus::Failed => error(status.as_str()),
            RunStatus::Pending | RunStatus::Running => info(status.as_str()),
        }
    }
}
