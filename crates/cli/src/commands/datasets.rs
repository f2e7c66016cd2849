//! List available datasets

use super::CommandContext;
use crate::output::TableFormatter;
use anyhow::{Context, Result};
use llm_eval_domain::DatasetInfo;

pub async fn list(ctx: &CommandContext) -> Result<Vec<DatasetInfo>> {
    let datasets = ctx
        .manager
        .list_datasets()
        .await
        .context("Failed to list datasets")?;

    ctx.emit(&datasets, |datasets| {
        TableFormatter::simple(
            vec!["Dataset", "Name", "Tasks", "Path"],
            datasets
                .iter()
                .map(|d| {
                    vec![
                        d.id.to_string(),
                        d.name.clone(),
                        d.task_count.to_string(),
                        d.path.clone().unwrap_or_default(),
                    ]
                })
                .collect(),
        )
    })?;

    Ok(datasets)
}
