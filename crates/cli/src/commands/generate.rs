//! One-off prompt to a single model

use super::CommandContext;
use crate::output::{colors, fmt_float, TableFormatter};
use anyhow::{Context, Result};
use llm_eval_application::PromptResponse;
use llm_eval_domain::ModelId;

pub async fn generate(ctx: &CommandContext, model: &str, prompt: &str) -> Result<PromptResponse> {
    let response = ctx
        .manager
        .generate_response(&ModelId::from(model), prompt)
        .await
        .with_context(|| format!("Generation with {model} failed"))?;

    ctx.emit(&response, |r| {
        let stats = TableFormatter::key_value(vec![
            ("Latency (s)", fmt_float(r.latency_seconds, 3)),
            ("Time to first token (s)", fmt_float(r.time_to_first_token_seconds, 3)),
            ("Tokens", r.token_count.to_string()),
            ("Tokens/s", fmt_float(r.tokens_per_second, 1)),
            ("Cost", fmt_float(r.total_cost, 6)),
        ]);
        format!("{}\n{}\n\n{}", colors::bold(r.model_id.as_str()), r.response, stats)
    })?;

    Ok(response)
}
