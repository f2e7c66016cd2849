//! Model backends and the factory that picks one per model descriptor.

mod openai_compatible;

pub use openai_compatible::OpenAiCompatibleClient;

use llm_eval_application::ports::{ModelClient, ModelClientProvider};
use llm_eval_domain::{ConfigurationError, ModelDescriptor, ModelType};
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Endpoint used for hosted models that do not set one
pub const DEFAULT_HOSTED_ENDPOINT: &str = "https://api.openai.com/v1";

/// Endpoint used for local models that do not set one (Ollama)
pub const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:11434/v1";

/// Builds model clients from descriptors.
///
/// - `hosted_api` needs `api_key_env` naming a set environment variable
/// - `self_hosted` needs an `endpoint`; `api_key_env` is optional
/// - `local` defaults to a local Ollama endpoint and sends no key
#[derive(Debug, Clone)]
pub struct BackendFactory {
    http: reqwest::Client,
    hosted_endpoint: Url,
    local_endpoint: Url,
}

impl BackendFactory {
    pub fn new() -> Result<Self, ConfigurationError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigurationError::Source(format!("HTTP client: {e}")))?;
        Self::with_http_client(http)
    }

    pub fn with_http_client(http: reqwest::Client) -> Result<Self, ConfigurationError> {
        Ok(Self {
            http,
            hosted_endpoint: parse_endpoint(DEFAULT_HOSTED_ENDPOINT)?,
            local_endpoint: parse_endpoint(DEFAULT_LOCAL_ENDPOINT)?,
        })
    }

    pub fn with_local_endpoint(mut self, endpoint: Url) -> Self {
        self.local_endpoint = endpoint;
        self
    }

    pub fn with_hosted_endpoint(mut self, endpoint: Url) -> Self {
        self.hosted_endpoint = endpoint;
        self
    }

    /// Build the concrete client for a descriptor.
    pub fn build(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<OpenAiCompatibleClient, ConfigurationError> {
        let backend_error = |message: String| ConfigurationError::Backend {
            model_id: descriptor.model_id.clone(),
            message,
        };

        let (endpoint, api_key) = match descriptor.model_type {
            ModelType::HostedApi => {
                let var = descriptor
                    .api_key_env
                    .as_deref()
                    .ok_or_else(|| backend_error("hosted models need api_key_env".to_string()))?;
                let key = std::env::var(var)
                    .map_err(|_| backend_error(format!("environment variable {var} is not set")))?;
                let endpoint = descriptor
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| self.hosted_endpoint.clone());
                (endpoint, Some(key))
            }
            ModelType::SelfHosted => {
                let endpoint = descriptor
                    .endpoint
                    .clone()
                    .ok_or_else(|| backend_error("self-hosted models need an endpoint".to_string()))?;
                let key = match descriptor.api_key_env.as_deref() {
                    Some(var) => Some(std::env::var(var).map_err(|_| {
                        backend_error(format!("environment variable {var} is not set"))
                    })?),
                    None => None,
                };
                (endpoint, key)
            }
            ModelType::Local => {
                let endpoint = descriptor
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| self.local_endpoint.clone());
                (endpoint, None)
            }
        };

        debug!(
            model_id = %descriptor.model_id,
            backend = descriptor.model_type.display_name(),
            endpoint = %endpoint,
            "Created model client"
        );

        Ok(OpenAiCompatibleClient::new(
            self.http.clone(),
            &endpoint,
            descriptor.provider_model_name(),
            api_key,
            descriptor.pricing,
        ))
    }
}

fn parse_endpoint(url: &str) -> Result<Url, ConfigurationError> {
    Url::parse(url).map_err(|e| ConfigurationError::Source(format!("endpoint {url}: {e}")))
}

impl ModelClientProvider for BackendFactory {
    fn client_for(
        &self,
        descriptor: &ModelDescriptor,
    ) -> Result<Arc<dyn ModelClient>, ConfigurationError> {
        Ok(Arc::new(self.build(descriptor)?))
    }
}
