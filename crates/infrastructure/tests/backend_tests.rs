//! HTTP model backend tests against a mock OpenAI-compatible server

use llm_eval_application::ports::ModelClient;
use llm_eval_domain::{ErrorCategory, GenerationOptions, ModelDescriptor, ModelError, ModelType, Pricing};
use llm_eval_infrastructure::{BackendFactory, OpenAiCompatibleClient};
use serde_json::json;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STREAM: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\"The capital\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\" is Paris.\"}}]}\n\n",
    "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":1000,\"completion_tokens\":2000}}\n\n",
    "data: [DONE]\n\n",
);

fn client(server: &MockServer, api_key: Option<&str>, pricing: Pricing) -> OpenAiCompatibleClient {
    let endpoint = Url::parse(&format!("{}/v1", server.uri())).unwrap();
    OpenAiCompatibleClient::new(
        reqwest::Client::new(),
        &endpoint,
        "test-model",
        api_key.map(str::to_string),
        pricing,
    )
}

#[tokio::test]
async fn test_streamed_completion_is_measured_and_priced() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "test-model", "stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(STREAM, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let pricing = Pricing {
        prompt_price_per_1k: 0.01,
        completion_price_per_1k: 0.02,
        input_price_per_1k: 0.001,
        output_price_per_1k: 0.002,
    };
    let generation = client(&server, Some("sk-test"), pricing)
        .generate("What is the capital of France?", &GenerationOptions::default())
        .await
        .unwrap();

    assert_eq!(generation.text, "The capital is Paris.");
    assert_eq!(generation.prompt_tokens, 1000);
    assert_eq!(generation.token_count, 2000);
    assert!((generation.api_cost - 0.05).abs() < 1e-12);
    assert!((generation.infrastructure_cost - 0.005).abs() < 1e-12);
    assert!((generation.total_cost() - 0.055).abs() < 1e-12);
    assert!(generation.latency_seconds >= generation.time_to_first_token_seconds);
}

#[tokio::test]
async fn test_plain_json_response_is_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"role": "assistant", "content": "Tokyo"}}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 1}
        })))
        .mount(&server)
        .await;

    let generation = client(&server, None, Pricing::default())
        .generate("What is the capital of Japan?", &GenerationOptions::default())
        .await
        .unwrap();

    assert_eq!(generation.text, "Tokyo");
    assert_eq!(generation.token_count, 1);
    assert_eq!(generation.api_cost, 0.0);
}

#[tokio::test]
async fn test_http_errors_are_classified() {
    let cases = [
        (429, ErrorCategory::Transient),
        (503, ErrorCategory::Transient),
        (408, ErrorCategory::Transient),
        (400, ErrorCategory::Permanent),
        (401, ErrorCategory::Permanent),
    ];

    for (status, category) in cases {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
            .mount(&server)
            .await;

        let error = client(&server, None, Pricing::default())
            .generate("hi", &GenerationOptions::default())
            .await
            .unwrap_err();
        assert_eq!(error.category(), category, "status {status}");
    }
}

#[tokio::test]
async fn test_slow_server_times_out_as_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(STREAM, "text/event-stream")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let options = GenerationOptions {
        timeout: Duration::from_millis(100),
        ..GenerationOptions::default()
    };
    let error = client(&server, None, Pricing::default())
        .generate("hi", &options)
        .await
        .unwrap_err();
    assert!(matches!(error, ModelError::Timeout(_)));
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_unreachable_endpoint_is_a_connection_error() {
    // port 9 (discard) is not expected to accept HTTP connections
    let endpoint = Url::parse("http://127.0.0.1:9/v1").unwrap();
    let client = OpenAiCompatibleClient::new(
        reqwest::Client::new(),
        &endpoint,
        "m",
        None,
        Pricing::default(),
    );

    let error = client
        .generate("hi", &GenerationOptions::default())
        .await
        .unwrap_err();
    assert!(error.is_retryable());
}

#[tokio::test]
async fn test_factory_builds_local_client_against_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({"model": "llama3:8b"})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(STREAM, "text/event-stream"))
        .mount(&server)
        .await;

    let factory = BackendFactory::new()
        .unwrap()
        .with_local_endpoint(Url::parse(&format!("{}/v1", server.uri())).unwrap());
    let mut descriptor = ModelDescriptor::new("llama3", ModelType::Local);
    descriptor.model_name = Some("llama3:8b".to_string());

    let generation = factory
        .build(&descriptor)
        .unwrap()
        .generate("hi", &GenerationOptions::default())
        .await
        .unwrap();
    assert_eq!(generation.text, "The capital is Paris.");
}
