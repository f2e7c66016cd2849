//! List configured models

use super::CommandContext;
use crate::output::{fmt_float, TableFormatter};
use anyhow::{Context, Result};
use llm_eval_domain::ModelDescriptor;

pub async fn list(ctx: &CommandContext) -> Result<Vec<ModelDescriptor>> {
    let models = ctx
        .manager
        .list_models()
        .await
        .context("Failed to read model configuration")?;

    ctx.emit(&models, |models| {
        TableFormatter::simple(
            vec!["Model", "Type", "Description", "Endpoint", "Prompt $/1k", "Completion $/1k"],
            models
                .iter()
                .map(|m| {
                    vec![
                        m.model_id.to_string(),
                        m.model_type.display_name().to_string(),
                        m.description.clone(),
                        m.endpoint.as_ref().map(|u| u.to_string()).unwrap_or_default(),
                        fmt_float(m.pricing.prompt_price_per_1k, 4),
                        fmt_float(m.pricing.completion_price_per_1k, 4),
                    ]
                })
                .collect(),
        )
    })?;

    Ok(models)
}
