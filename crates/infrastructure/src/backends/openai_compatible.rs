//! Client for OpenAI-compatible chat completion endpoints.
//!
//! Hosted APIs, vLLM/TGI style self-hosted servers and local runtimes such as
//! Ollama all expose `POST {endpoint}/chat/completions`. Responses are streamed
//! so time to first token can be measured at the first content delta.

use async_trait::async_trait;
use llm_eval_application::ports::ModelClient;
use llm_eval_domain::{Generation, GenerationOptions, ModelError, Pricing};
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, instrument};
use url::Url;

/// Token counts reported by the server
#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Usage {
    prompt_tokens: Option<u64>,
    completion_tokens: Option<u64>,
}

impl Usage {
    fn from_json(value: &Value) -> Self {
        Self {
            prompt_tokens: value.get("prompt_tokens").and_then(Value::as_u64),
            completion_tokens: value.get("completion_tokens").and_then(Value::as_u64),
        }
    }
}

/// One decoded server-sent event line
#[derive(Debug, PartialEq)]
enum SseLine {
    Data(Value),
    Done,
    Skip,
}

fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }
    serde_json::from_str(data)
        .map(SseLine::Data)
        .unwrap_or(SseLine::Skip)
}

/// Rough token estimate used when the server reports no usage
fn estimate_tokens(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

fn map_send_error(error: reqwest::Error) -> ModelError {
    if error.is_timeout() {
        ModelError::Timeout(error.to_string())
    } else {
        ModelError::Connection(error.to_string())
    }
}

/// Accumulates a streamed completion.
#[derive(Debug, Default)]
struct StreamState {
    buffer: Vec<u8>,
    text: String,
    usage: Usage,
    first_token_at: Option<Instant>,
    done: bool,
}

impl StreamState {
    /// Feed raw bytes; complete lines are decoded, a trailing partial line is kept.
    fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.line(&String::from_utf8_lossy(&line));
        }
    }

    fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.line(&String::from_utf8_lossy(&rest));
        }
    }

    fn line(&mut self, line: &str) {
        if self.done {
            return;
        }
        match parse_sse_line(line) {
            SseLine::Done => self.done = true,
            SseLine::Skip => {}
            SseLine::Data(data) => {
                if let Some(usage) = data.get("usage").filter(|u| !u.is_null()) {
                    self.usage = Usage::from_json(usage);
                }
                let content = data
                    .pointer("/choices/0/delta/content")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if !content.is_empty() {
                    if self.first_token_at.is_none() {
                        self.first_token_at = Some(Instant::now());
                    }
                    self.text.push_str(content);
                }
            }
        }
    }
}

/// Model client for one model behind an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    chat_url: String,
    model_name: String,
    api_key: Option<String>,
    pricing: Pricing,
}

impl OpenAiCompatibleClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: &Url,
        model_name: impl Into<String>,
        api_key: Option<String>,
        pricing: Pricing,
    ) -> Self {
        Self {
            http,
            chat_url: format!("{}/chat/completions", endpoint.as_str().trim_end_matches('/')),
            model_name: model_name.into(),
            api_key,
            pricing,
        }
    }

    pub fn chat_url(&self) -> &str {
        &self.chat_url
    }

    fn request_body(&self, prompt: &str, options: &GenerationOptions) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = &options.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        messages.push(json!({"role": "user", "content": prompt}));

        let mut body = json!({
            "model": self.model_name,
            "messages": messages,
            "stream": true,
            "stream_options": {"include_usage": true},
        });
        if let Some(max_tokens) = options.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temperature) = options.temperature {
            body["temperature"] = json!(temperature);
        }
        body
    }

    fn generation(
        &self,
        prompt: &str,
        text: String,
        usage: Usage,
        started: Instant,
        first_token_at: Option<Instant>,
    ) -> Generation {
        let latency = started.elapsed();
        let ttft = first_token_at.map(|t| t - started).unwrap_or(latency);
        let prompt_tokens = usage.prompt_tokens.unwrap_or_else(|| estimate_tokens(prompt));
        let token_count = usage.completion_tokens.unwrap_or_else(|| estimate_tokens(&text));

        Generation {
            text,
            token_count,
            prompt_tokens,
            time_to_first_token_seconds: ttft.as_secs_f64(),
            latency_seconds: latency.as_secs_f64(),
            api_cost: self.pricing.api_cost(prompt_tokens, token_count),
            infrastructure_cost: self.pricing.infrastructure_cost(prompt_tokens, token_count),
        }
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    #[instrument(skip_all, fields(model = %self.model_name))]
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<Generation, ModelError> {
        let started = Instant::now();

        let mut request = self
            .http
            .post(&self.chat_url)
            .timeout(options.timeout)
            .json(&self.request_body(prompt, options));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let mut response = request.send().await.map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::from_status(status.as_u16(), body));
        }

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        // Some servers ignore `stream` and answer with a single JSON body
        if is_json {
            let body: Value = response
                .json()
                .await
                .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;
            let text = body
                .pointer("/choices/0/message/content")
                .and_then(Value::as_str)
                .ok_or_else(|| ModelError::InvalidResponse("missing choices[0].message.content".into()))?
                .to_string();
            let usage = body.get("usage").map(Usage::from_json).unwrap_or_default();
            return Ok(self.generation(prompt, text, usage, started, None));
        }

        let mut stream = StreamState::default();
        while let Some(chunk) = response.chunk().await.map_err(map_send_error)? {
            stream.push(&chunk);
            if stream.done {
                break;
            }
        }
        stream.finish();

        if !stream.done && stream.text.is_empty() {
            return Err(ModelError::InvalidResponse(
                "stream ended without content".to_string(),
            ));
        }

        let generation = self.generation(
            prompt,
            stream.text,
            stream.usage,
            started,
            stream.first_token_at,
        );
        debug!(
            tokens = generation.token_count,
            latency = generation.latency_seconds,
            "Completion streamed"
        );
        Ok(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line("event: message"), SseLine::Skip);
        assert_eq!(parse_sse_line("data: {not json"), SseLine::Skip);
        assert!(matches!(parse_sse_line(r#"data: {"a": 1}"#), SseLine::Data(_)));
    }

    #[test]
    fn test_stream_state_handles_split_lines() {
        let mut state = StreamState::default();
        state.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel");
        assert!(state.text.is_empty());
        state.push(b"lo\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"content\":\" world\"}}]}\n");
        state.push(b"data: {\"choices\":[],\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":2}}\n");
        state.push(b"data: [DONE]\n");
        state.push(b"data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n");

        assert!(state.done);
        assert_eq!(state.text, "Hello world");
        assert_eq!(state.usage.prompt_tokens, Some(7));
        assert_eq!(state.usage.completion_tokens, Some(2));
        assert!(state.first_token_at.is_some());
    }

    #[test]
    fn test_request_body() {
        let client = OpenAiCompatibleClient::new(
            reqwest::Client::new(),
            &Url::parse("http://localhost:8000/v1/").unwrap(),
            "llama3",
            None,
            Pricing::default(),
        );
        assert_eq!(client.chat_url(), "http://localhost:8000/v1/chat/completions");

        let options = GenerationOptions {
            max_tokens: Some(64),
            system_prompt: Some("be brief".into()),
            ..GenerationOptions::default()
        };
        let body = client.request_body("hi", &options);
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert!(body.get("temperature").is_none());
    }
}
