//! Metric catalog.
//!
//! Describes the metrics the platform knows about. Scoring itself is done by
//! pluggable scorers registered under the same ids.

use crate::identifiers::MetricId;
use crate::task::TaskType;
use serde::{Deserialize, Serialize};

/// Catalog entry for a metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: MetricId,
    pub name: String,
    pub description: String,
    pub higher_is_better: bool,
}

impl MetricDefinition {
    fn new(id: &str, name: &str, description: &str, higher_is_better: bool) -> Self {
        Self {
            id: MetricId::from(id),
            name: name.to_string(),
            description: description.to_string(),
            higher_is_better,
        }
    }
}

/// All metrics known to the platform, in display order.
pub fn metric_catalog() -> Vec<MetricDefinition> {
    vec![
        MetricDefinition::new("f1", "F1 Score", "Harmonic mean of precision and recall", true),
        MetricDefinition::new(
            "context_relevance",
            "Context Relevance",
            "Measures relevance of response to provided context",
            true,
        ),
        MetricDefinition::new(
            "hallucination",
            "Hallucination",
            "Detects information not present in the context (lower is better)",
            false,
        ),
        MetricDefinition::new(
            "faithfulness",
            "Faithfulness",
            "Measures faithfulness to the provided context",
            true,
        ),
        MetricDefinition::new(
            "answer_relevance",
            "Answer Relevance",
            "Measures how well the answer addresses the question",
            true,
        ),
        MetricDefinition::new(
            "conciseness",
            "Conciseness",
            "Measures brevity and clarity of response",
            true,
        ),
        MetricDefinition::new(
            "coherence",
            "Coherence",
            "Measures logical flow and coherence of text",
            true,
        ),
        MetricDefinition::new("creativity", "Creativity", "Measures originality and creativity", true),
        MetricDefinition::new("length", "Response Length", "Measures length of response", true),
        MetricDefinition::new(
            "exact_match",
            "Exact Match",
            "Response equals the reference answer",
            true,
        ),
        MetricDefinition::new(
            "contains",
            "Contains Reference",
            "Response contains the reference answer",
            true,
        ),
    ]
}

/// Look up a catalog entry by id.
pub fn find_metric(id: &str) -> Option<MetricDefinition> {
    metric_catalog().into_iter().find(|m| m.id.as_str() == id)
}

pub(crate) fn default_metrics_for(task_type: TaskType) -> Vec<MetricId> {
    let ids: &[&str] = match task_type {
        TaskType::Rag => &[
            "f1",
            "context_relevance",
            "hallucination",
            "faithfulness",
            "answer_relevance",
            "conciseness",
        ],
        TaskType::Generation => &["coherence", "creativity", "conciseness"],
        TaskType::Qa => &["f1", "answer_relevance", "conciseness"],
    };
    ids.iter().copied().map(MetricId::from).collect()
}
