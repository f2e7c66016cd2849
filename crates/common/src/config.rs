//! Configuration management for the evaluation engine.
//!
//! Settings are loaded from configuration files and environment variables and
//! handed to the run manager as an immutable `Arc<EvalConfig>`.
//!
//! ## Example Configuration
//!
//! ```toml
//! [dispatch]
//! global_concurrency = 10
//! per_model_concurrency = 3
//! request_timeout_secs = 120
//!
//! [retry]
//! max_retries = 3
//! initial_backoff_ms = 1000
//! backoff_multiplier = 2.0
//! max_backoff_ms = 30000
//! jitter = true
//!
//! [cancellation]
//! grace_period_secs = 30
//!
//! [paths]
//! datasets_dir = "configs/datasets"
//! models_config = "configs/models/models_config.json"
//! ```

use crate::retry::RetryConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvalConfig {
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub cancellation: CancellationConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Dispatcher concurrency and timeout settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum in-flight model calls across the whole run
    #[serde(default = "default_global_concurrency")]
    pub global_concurrency: usize,

    /// Maximum in-flight calls per model unless the model overrides it
    #[serde(default = "default_per_model_concurrency")]
    pub per_model_concurrency: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Retry policy for transient model errors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Retries after the first execution (0 means no retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Randomize each delay to avoid synchronized retries
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

/// Cancellation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancellationConfig {
    /// How long in-flight attempts may keep running after a cancel
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
}

/// File locations used by the file-backed providers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_datasets_dir")]
    pub datasets_dir: PathBuf,

    #[serde(default = "default_models_config")]
    pub models_config: PathBuf,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Enable JSON logging format
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// Default value functions
fn default_global_concurrency() -> usize {
    10
}

fn default_per_model_concurrency() -> usize {
    3
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_jitter() -> bool {
    true
}

fn default_grace_period() -> u64 {
    30
}

fn default_datasets_dir() -> PathBuf {
    PathBuf::from("configs/datasets")
}

fn default_models_config() -> PathBuf {
    PathBuf::from("configs/models/models_config.json")
}

fn default_service_name() -> String {
    "llm-eval".to_string()
}

fn default_json_logging() -> bool {
    false
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            global_concurrency: default_global_concurrency(),
            per_model_concurrency: default_per_model_concurrency(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            jitter: default_jitter(),
        }
    }
}

impl Default for CancellationConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: default_grace_period(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            datasets_dir: default_datasets_dir(),
            models_config: default_models_config(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            json_logging: default_json_logging(),
            log_level: default_log_level(),
        }
    }
}

impl EvalConfig {
    /// Load configuration from configuration files and environment variables.
    ///
    /// Sources in order (later sources override earlier ones):
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/{environment}.toml (if exists, where environment is from EVAL_ENV)
    /// 4. Environment variables (prefixed with EVAL__)
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like [`EvalConfig::load`], with an explicit file layered over the
    /// environment-specific one. The explicit file must exist.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let env = std::env::var("EVAL_ENV").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", env)).required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        // Example: EVAL__DISPATCH__GLOBAL_CONCURRENCY=20
        let config = builder
            .add_source(
                config::Environment::with_prefix("EVAL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let eval_config: EvalConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        eval_config.validate()?;

        Ok(eval_config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.global_concurrency == 0 {
            anyhow::bail!("Global concurrency must be greater than 0");
        }

        if self.dispatch.per_model_concurrency == 0 {
            anyhow::bail!("Per-model concurrency must be greater than 0");
        }

        if self.dispatch.request_timeout_secs == 0 {
            anyhow::bail!("Request timeout must be greater than 0");
        }

        if self.retry.backoff_multiplier < 1.0 {
            anyhow::bail!(
                "Backoff multiplier must be at least 1.0, got {}",
                self.retry.backoff_multiplier
            );
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            anyhow::bail!(
                "Initial backoff ({}ms) exceeds max backoff ({}ms)",
                self.retry.initial_backoff_ms,
                self.retry.max_backoff_ms
            );
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.telemetry.log_level.as_str()) {
            anyhow::bail!(
                "Invalid log level '{}'. Must be one of: {}",
                self.telemetry.log_level,
                valid_log_levels.join(", ")
            );
        }

        Ok(())
    }

    /// Get the per-request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch.request_timeout_secs)
    }

    /// Get the cancellation grace period as a Duration
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.cancellation.grace_period_secs)
    }

    /// Build the backoff policy used by the dispatcher
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry.max_retries,
            initial_delay: Duration::from_millis(self.retry.initial_backoff_ms),
            max_delay: Duration::from_millis(self.retry.max_backoff_ms),
            backoff_multiplier: self.retry.backoff_multiplier,
            jitter: self.retry.jitter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EvalConfig::default();
        assert_eq!(config.dispatch.global_concurrency, 10);
        assert_eq!(config.dispatch.per_model_concurrency, 3);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.grace_period(), Duration::from_secs(30));
        assert_eq!(config.request_timeout(), Duration::from_secs(120));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_config_conversion() {
        let retry = EvalConfig::default().retry_config();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay, Duration::from_secs(1));
        assert_eq!(retry.max_delay, Duration::from_secs(30));
        assert_eq!(retry.backoff_multiplier, 2.0);
        assert!(retry.jitter);
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = EvalConfig::default();
        config.dispatch.global_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = EvalConfig::default();
        config.dispatch.per_model_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        let mut config = EvalConfig::default();
        config.telemetry.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[dispatch]\nglobal_concurrency = 4\n\n[cancellation]\ngrace_period_secs = 5"
        )
        .unwrap();

        let config = EvalConfig::load_from(Some(file.path())).unwrap();
        assert_eq!(config.dispatch.global_concurrency, 4);
        assert_eq!(config.dispatch.per_model_concurrency, 3);
        assert_eq!(config.cancellation.grace_period_secs, 5);
    }

    #[test]
    fn test_load_from_missing_file_fails() {
        let result = EvalConfig::load_from(Some(Path::new("does/not/exist.toml")));
        assert!(result.is_err());
    }
}
