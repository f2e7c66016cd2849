//! Model descriptors, pricing, and the generation contract shared by all backends.

use crate::identifiers::ModelId;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Kind of backend serving a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    /// Third-party hosted API billed per token
    #[serde(alias = "api", alias = "hosted")]
    HostedApi,
    /// Model served on infrastructure we pay for
    #[serde(alias = "self-hosted")]
    SelfHosted,
    /// Model served on the local machine
    Local,
}

impl ModelType {
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::HostedApi => "Hosted API",
            Self::SelfHosted => "Self-hosted",
            Self::Local => "Local",
        }
    }
}

/// Per-1k-token prices.
///
/// Prompt/completion prices produce API cost; input/output prices produce
/// infrastructure cost. A model may set both pairs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    #[serde(default)]
    pub prompt_price_per_1k: f64,
    #[serde(default)]
    pub completion_price_per_1k: f64,
    #[serde(default)]
    pub input_price_per_1k: f64,
    #[serde(default)]
    pub output_price_per_1k: f64,
}

impl Pricing {
    pub fn api_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        per_1k(prompt_tokens, self.prompt_price_per_1k)
            + per_1k(completion_tokens, self.completion_price_per_1k)
    }

    pub fn infrastructure_cost(&self, prompt_tokens: u64, completion_tokens: u64) -> f64 {
        per_1k(prompt_tokens, self.input_price_per_1k)
            + per_1k(completion_tokens, self.output_price_per_1k)
    }
}

fn per_1k(tokens: u64, price: f64) -> f64 {
    tokens as f64 / 1000.0 * price
}

/// Configuration entry for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    #[serde(default = "unnamed_model")]
    pub model_id: ModelId,
    #[serde(rename = "type")]
    pub model_type: ModelType,
    #[serde(default)]
    pub description: String,
    /// Name the backend knows the model by; defaults to `model_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Url>,
    /// Environment variable holding the API key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Overrides the dispatcher's per-model concurrency limit
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(flatten)]
    pub pricing: Pricing,
}

fn unnamed_model() -> ModelId {
    ModelId::from("")
}

impl ModelDescriptor {
    pub fn new(model_id: impl Into<ModelId>, model_type: ModelType) -> Self {
        Self {
            model_id: model_id.into(),
            model_type,
            description: String::new(),
            model_name: None,
            endpoint: None,
            api_key_env: None,
            max_concurrency: None,
            pricing: Pricing::default(),
        }
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn provider_model_name(&self) -> &str {
        self.model_name.as_deref().unwrap_or(self.model_id.as_str())
    }
}

/// Options passed to a model for a single generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: None,
            temperature: None,
            system_prompt: None,
            timeout: Duration::from_secs(120),
        }
    }
}

/// What a model client returns for a successful call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub text: String,
    /// Completion tokens produced
    pub token_count: u64,
    #[serde(default)]
    pub prompt_tokens: u64,
    pub time_to_first_token_seconds: f64,
    pub latency_seconds: f64,
    #[serde(default)]
    pub api_cost: f64,
    #[serde(default)]
    pub infrastructure_cost: f64,
}

impl Generation {
    /// Completion tokens per second of latency; 0 when latency is 0.
    pub fn tokens_per_second(&self) -> f64 {
        if self.latency_seconds > 0.0 {
            self.token_count as f64 / self.latency_seconds
        } else {
            0.0
        }
    }

    pub fn total_cost(&self) -> f64 {
        self.api_cost + self.infrastructure_cost
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
