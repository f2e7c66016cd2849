//! Run an evaluation
//!
//! Starts a run, follows its events on a progress bar, and prints the summary
//! once the run is terminal. Ctrl-C cancels the run; attempts already in flight
//! get the configured grace period before they are aborted.

use super::CommandContext;
use crate::output::{colors, summary_tables, TableFormatter};
use crate::progress::run_progress;
use anyhow::{bail, Context, Result};
use llm_eval_application::{RunEvent, SummaryMode};
use llm_eval_domain::{EvaluationRequest, RunStatus, Summary};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// Arguments of `llm-eval run`
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub dataset: String,
    pub models: Vec<String>,
    /// Empty uses the dataset's default metrics
    pub metrics: Vec<String>,
    pub experiment_name: Option<String>,
}

impl RunArgs {
    fn request(&self) -> EvaluationRequest {
        let name = self
            .experiment_name
            .clone()
            .unwrap_or_else(|| format!("{}-evaluation", self.dataset));
        EvaluationRequest::new(
            name,
            self.dataset.as_str(),
            self.models.iter().map(String::as_str),
            self.metrics.iter().map(String::as_str),
        )
    }
}

/// What the command prints in JSON mode
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub status: RunStatus,
    pub summary: Summary,
}

pub async fn execute(ctx: &CommandContext, args: RunArgs) -> Result<RunReport> {
    let manager = &ctx.manager;

    // Subscribe first so no event of the new run is missed
    let mut events = manager.subscribe();
    let run_id = manager
        .start_evaluation(args.request())
        .await
        .context("Failed to start evaluation")?;

    let run = manager.get_run(run_id)?;
    if run.status == RunStatus::Failed {
        bail!(
            "Run {} failed: {}",
            run_id,
            run.failure_reason.unwrap_or_default()
        );
    }

    if !ctx.is_json() {
        println!(
            "{} {} ({} tasks x {} models, metrics: {})",
            colors::bold("Running"),
            run.experiment_name,
            run.task_count,
            run.model_ids.len(),
            run.metric_ids
                .iter()
                .map(|m| m.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let progress = run_progress((run.task_count * run.model_ids.len()) as u64, !ctx.is_json());
    let finished = manager.wait(run_id);
    tokio::pin!(finished);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);
    let mut cancelled = false;

    let status = loop {
        tokio::select! {
            status = &mut finished => break status?,
            _ = &mut interrupt, if !cancelled => {
                cancelled = true;
                progress.set_message("cancelling, waiting for in-flight attempts");
                manager.cancel(run_id).await?;
            }
            event = events.recv() => match event {
                Ok(RunEvent::AttemptFinished { run_id: id, .. }) if id == run_id => progress.inc(1),
                Ok(RunEvent::AttemptRetrying { run_id: id, model_id, task_id, attempt_number, .. })
                    if id == run_id =>
                {
                    progress.set_message(format!("retrying {task_id} on {model_id} ({attempt_number})"));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Progress events lagged"),
                // Keep waiting on the run itself
                Err(RecvError::Closed) => break finished.as_mut().await?,
            }
        }
    };
    progress.finish_and_clear();

    if status == RunStatus::Failed {
        let run = manager.get_run(run_id)?;
        bail!(
            "Run {} failed: {}",
            run_id,
            run.failure_reason.unwrap_or_default()
        );
    }

    let summary = manager.get_summary(run_id, SummaryMode::FinalOnly)?;
    let report = RunReport { status, summary };

    ctx.emit(&report, |report| render(report))?;
    Ok(report)
}

fn render(report: &RunReport) -> String {
    let summary = &report.summary;
    let (performance, scores) = summary_tables(summary);

    let overview = TableFormatter::key_value(vec![
        ("Run", summary.run_id.to_string()),
        ("Experiment", summary.experiment_name.clone()),
        ("Dataset", format!("{} ({})", summary.dataset_name, summary.dataset_id)),
        ("Tasks", summary.task_count.to_string()),
        ("Status", colors::status(report.status).to_string()),
    ]);

    let mut out = format!(
        "{overview}\n\n{}\n{performance}\n\n{}\n{scores}",
        colors::bold("Performance"),
        colors::bold("Scores")
    );

    let missing: Vec<&str> = summary.models_without_successes().map(|m| m.as_str()).collect();
    if !missing.is_empty() {
        out.push_str(&format!(
            "\n\n{} no successful attempts for: {}",
            colors::warning("warning:"),
            missing.join(", ")
        ));
    }
    out
}
