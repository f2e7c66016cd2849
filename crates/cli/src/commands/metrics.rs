//! Metric catalog listing

use super::CommandContext;
use crate::output::TableFormatter;
use anyhow::Result;
use llm_eval_domain::{metric_catalog, MetricId, TaskType};
use serde::Serialize;
use std::collections::BTreeMap;

/// One row of the metric listing
#[derive(Debug, Clone, Serialize)]
pub struct MetricEntry {
    pub id: MetricId,
    pub name: String,
    pub description: String,
    pub higher_is_better: bool,
    /// A scorer is registered, so the metric can be requested in a run
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricListing {
    pub metrics: Vec<MetricEntry>,
    pub task_type_defaults: BTreeMap<String, Vec<MetricId>>,
}

/// Catalog metrics plus any registered scorer the catalog does not describe.
pub fn listing(ctx: &CommandContext) -> MetricListing {
    let scorers = ctx.manager.scorers();

    let mut metrics: Vec<MetricEntry> = metric_catalog()
        .into_iter()
        .map(|m| MetricEntry {
            available: scorers.contains(m.id.as_str()),
            id: m.id,
            name: m.name,
            description: m.description,
            higher_is_better: m.higher_is_better,
        })
        .collect();

    for id in scorers.metric_ids() {
        if !metrics.iter().any(|m| m.id == id) {
            metrics.push(MetricEntry {
                name: id.to_string(),
                id,
                description: String::new(),
                higher_is_better: true,
                available: true,
            });
        }
    }

    let task_type_defaults = [
        ("qa", TaskType::Qa),
        ("rag", TaskType::Rag),
        ("generation", TaskType::Generation),
    ]
    .into_iter()
    .map(|(name, task_type)| (name.to_string(), task_type.default_metrics()))
    .collect();

    MetricListing {
        metrics,
        task_type_defaults,
    }
}

pub fn list(ctx: &CommandContext) -> Result<MetricListing> {
    let listing = listing(ctx);

    ctx.emit(&listing, |listing| {
        TableFormatter::simple(
            vec!["Metric", "Name", "Direction", "Available", "Description"],
            listing
                .metrics
                .iter()
                .map(|m| {
                    vec![
                        m.id.to_string(),
                        m.name.clone(),
                        if m.higher_is_better { "higher" } else { "lower" }.to_string(),
                        if m.available { "yes" } else { "no" }.to_string(),
                        m.description.clone(),
                    ]
                })
                .collect(),
        )
    })?;

    Ok(listing)
}
