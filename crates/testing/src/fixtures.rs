//! Test fixtures for building domain values with sensible defaults.

use llm_eval_common::EvalConfig;
use llm_eval_domain::{
    Dataset, DatasetId, EvaluationRequest, Generation, MetricId, ModelDescriptor, ModelId,
    ModelType, Pricing, Task, TaskType,
};

/// Create the `index`-th test task. Its reference answer is `answer-{index}`.
pub fn create_test_task(index: usize) -> Task {
    Task::new(format!("task-{index}"), format!("Question number {index}?"))
        .with_reference(format!("answer-{index}"))
}

/// Create `count` test tasks with distinct ids
pub fn create_test_tasks(count: usize) -> Vec<Task> {
    (1..=count).map(create_test_task).collect()
}

/// Create a QA dataset with `task_count` tasks
pub fn create_test_dataset(id: &str, task_count: usize) -> Dataset {
    Dataset {
        id: DatasetId::from(id),
        name: format!("{id} dataset"),
        task_type: Some(TaskType::Qa),
        tasks: create_test_tasks(task_count),
    }
}

/// Create a hosted model descriptor with no pricing
pub fn create_test_descriptor(model_id: &str) -> ModelDescriptor {
    ModelDescriptor::new(model_id, ModelType::HostedApi)
}

/// Create a hosted model descriptor billed `api_price_per_1k` for prompt and completion tokens
pub fn create_priced_descriptor(model_id: &str, api_price_per_1k: f64) -> ModelDescriptor {
    create_test_descriptor(model_id).with_pricing(Pricing {
        prompt_price_per_1k: api_price_per_1k,
        completion_price_per_1k: api_price_per_1k,
        ..Pricing::default()
    })
}

/// Create a generation with fixed measurements
pub fn create_test_generation(text: impl Into<String>) -> Generation {
    let text = text.into();
    Generation {
        token_count: text.split_whitespace().count() as u64,
        text,
        prompt_tokens: 8,
        time_to_first_token_seconds: 0.05,
        latency_seconds: 0.5,
        api_cost: 0.0,
        infrastructure_cost: 0.0,
    }
}

/// Create an evaluation request
pub fn create_test_request<M, K>(
    dataset_id: &str,
    model_ids: impl IntoIterator<Item = M>,
    metric_ids: impl IntoIterator<Item = K>,
) -> EvaluationRequest
where
    M: Into<ModelId>,
    K: Into<MetricId>,
{
    EvaluationRequest::new("test-experiment", dataset_id, model_ids, metric_ids)
}

/// Configuration with small limits and fast retries, without jitter.
pub fn create_test_config() -> EvalConfig {
    let mut config = EvalConfig::default();
    config.dispatch.global_concurrency = 4;
    config.dispatch.per_model_concurrency = 2;
    config.dispatch.request_timeout_secs = 5;
    config.retry.max_retries = 3;
    config.retry.initial_backoff_ms = 100;
    config.retry.backoff_multiplier = 2.0;
    config.retry.max_backoff_ms = 1_000;
    config.retry.jitter = false;
    config.cancellation.grace_period_secs = 2;
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tasks_have_unique_ids() {
        let dataset = create_test_dataset("qa", 10);
        assert_eq!(dataset.task_count(), 10);
        assert!(dataset.duplicate_task_id().is_none());
    }

    #[test]
    fn test_config_is_valid() {
        assert!(create_test_config().validate().is_ok());
    }
}
