//! LLM evaluation CLI
//!
//! Command-line interface for running evaluations of language models over
//! datasets and inspecting the models, datasets and metrics available.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

use llm_eval::commands::{datasets, generate, metrics, models, run, CommandContext};
use llm_eval::output::OutputFormat;
use llm_eval_application::ScorerRegistry;
use llm_eval_common::{init_tracing, EvalConfig};
use llm_eval_infrastructure::build_run_manager;

/// Output format for CLI commands
#[derive(Copy, Clone, Debug, Default, ValueEnum)]
pub enum CliOutputFormat {
    /// JSON output
    Json,
    /// Table output (default)
    #[default]
    Table,
}

impl From<CliOutputFormat> for OutputFormat {
    fn from(f: CliOutputFormat) -> Self {
        match f {
            CliOutputFormat::Json => OutputFormat::Json,
            CliOutputFormat::Table => OutputFormat::Table,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "llm-eval")]
#[command(author, version, about = "Evaluate LLMs over datasets")]
#[command(long_about = "Run evaluations of language models over task datasets.\n\n\
    Dispatches every task to every model with bounded concurrency, scores the \
    responses and prints per-model performance, cost and metric summaries.")]
#[command(propagate_version = true)]
struct Cli {
    /// Output format
    #[arg(short = 'o', long, global = true, value_enum, default_value = "table")]
    format: CliOutputFormat,

    /// Configuration file layered over config/default.toml
    #[arg(short, long, global = true, env = "LLM_EVAL_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evaluate a dataset against one or more models
    #[command(alias = "eval")]
    Run {
        /// Dataset ID
        #[arg(short, long)]
        dataset: String,

        /// Model IDs (comma separated or repeated)
        #[arg(short, long, value_delimiter = ',', required = true)]
        models: Vec<String>,

        /// Metric IDs (defaults to the dataset's task type defaults)
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,

        /// Experiment name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// List configured models
    Models,

    /// List available datasets
    #[command(alias = "ds")]
    Datasets,

    /// List metrics and which of them can be scored
    Metrics,

    /// Send one prompt to one model
    #[command(alias = "gen")]
    Generate {
        /// Model ID
        #[arg(short, long)]
        model: String,

        /// Prompt text
        #[arg(value_name = "PROMPT")]
        prompt: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup colored output
    if cli.no_color {
        colored::control::set_override(false);
    }

    let mut config = EvalConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    config.telemetry.log_level = if cli.verbose { "debug" } else { "warn" }.to_string();
    init_tracing(&config.telemetry)?;

    let scorers = Arc::new(ScorerRegistry::with_reference_scorers());
    let manager = build_run_manager(Arc::new(config), scorers)?;
    let ctx = CommandContext::new(manager, cli.format.into());

    // Execute command
    let result = match cli.command {
        Commands::Run {
            dataset,
            models,
            metrics,
            name,
        } => run::execute(
            &ctx,
            run::RunArgs {
                dataset,
                models,
                metrics,
                experiment_name: name,
            },
        )
        .await
        .map(|_| ()),
        Commands::Models => models::list(&ctx).await.map(|_| ()),
        Commands::Datasets => datasets::list(&ctx).await.map(|_| ()),
        Commands::Metrics => metrics::list(&ctx).map(|_| ()),
        Commands::Generate { model, prompt } => {
            generate::generate(&ctx, &model, &prompt).await.map(|_| ())
        }
    };

    // Handle errors
    if let Err(e) = result {
        use colored::Colorize;
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        if cli.verbose {
            eprintln!("\n{}", "Backtrace:".dimmed());
            eprintln!("{:?}", e);
        }
        std::process::exit(1);
    }

    Ok(())
}
