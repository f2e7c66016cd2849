//! Tasks and the datasets that hold them.

use crate::identifiers::{DatasetId, MetricId, TaskId};
use crate::metric::default_metrics_for;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single prompt to run against every model in a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "id")]
    pub task_id: TaskId,
    pub prompt: String,
    /// Expected answer, when the dataset has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Retrieved context for RAG-style tasks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Task {
    pub fn new(task_id: impl Into<TaskId>, prompt: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            prompt: prompt.into(),
            reference: None,
            context: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Text sent to the model: the prompt, preceded by the context when there is one.
    pub fn render_prompt(&self) -> String {
        match &self.context {
            Some(context) => format!("Context:\n{}\n\nQuestion: {}", context, self.prompt),
            None => self.prompt.clone(),
        }
    }
}

/// Broad kind of task a dataset contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Rag,
    Generation,
    Qa,
}

impl TaskType {
    pub fn default_metrics(&self) -> Vec<MetricId> {
        default_metrics_for(*self)
    }
}

/// A named collection of tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_type: Option<TaskType>,
    pub tasks: Vec<Task>,
}

impl Dataset {
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Returns the first task id that appears more than once, if any.
    pub fn duplicate_task_id(&self) -> Option<&TaskId> {
        let mut seen = std::collections::HashSet::new();
        self.tasks
            .iter()
            .map(|t| &t.task_id)
            .find(|id| !seen.insert(*id))
    }
}

/// Listing entry for a dataset that is available to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: DatasetId,
    pub name: String,
    pub task_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}
