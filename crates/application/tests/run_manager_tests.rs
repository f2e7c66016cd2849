//! Integration tests for the run lifecycle
//!
//! Every test runs on a paused clock: mock latencies and retry backoff advance
//! virtual time only, so the scenarios are deterministic.

use llm_eval_application::{RunEvent, SummaryMode};
use llm_eval_domain::{
    AttemptStatus, ErrorCategory, EvalError, MetricId, ModelError, ModelId, Pricing, RunError,
    RunId, RunStatus,
};
use llm_eval_testing::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const MODELS: [&str; 4] = ["model-a", "model-b", "model-c", "model-d"];

fn four_model_engine(probe: Arc<ConcurrencyProbe>) -> TestEngine {
    let mut builder = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 5))
        .with_scorer("quality", Arc::new(FixedScorer(0.8)));
    for model in MODELS {
        builder = builder.with_model(
            model,
            ScriptedModelClient::new()
                .with_latency(Duration::from_millis(200))
                .with_shared_probe(probe.clone()),
        );
    }
    builder.build()
}

#[tokio::test(start_paused = true)]
async fn test_five_tasks_four_models_completes() {
    let probe = ConcurrencyProbe::new();
    let engine = four_model_engine(probe.clone());

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", MODELS, ["quality"]))
        .await
        .unwrap();
    let status = engine.manager.wait(run_id).await.unwrap();
    assert_eq!(status, RunStatus::Completed);

    let results = engine.manager.get_run_results(run_id).unwrap();
    assert_eq!(results.len(), 20);
    assert!(results.iter().all(|s| s.attempt.status == AttemptStatus::Succeeded));

    let summary = engine.manager.get_summary(run_id, SummaryMode::FinalOnly).unwrap();
    assert_eq!(summary.model_summaries.len(), 4);
    assert_eq!(summary.task_count, 5);
    assert_eq!(summary.dataset_name, "qa dataset");
    for model in MODELS {
        let model_summary = &summary.model_summaries[&ModelId::from(model)];
        assert_eq!(model_summary.success_count, 5);
        assert_eq!(model_summary.failure_count, 0);
        assert!((model_summary.metric_scores[&MetricId::from("quality")] - 0.8).abs() < 1e-12);
        assert!((model_summary.avg_latency - 0.2).abs() < 1e-12);
    }

    // global limit 4, per-model limit 2
    assert!(probe.max() <= 4);
    for model in MODELS {
        let client = engine.client(model);
        assert!(client.max_in_flight() <= 2);
        assert_eq!(client.overlapping_calls(), 0);
        assert_eq!(client.call_count(), 5);
    }
}

#[tokio::test(start_paused = true)]
async fn test_model_that_always_times_out_makes_run_partial() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 2))
        .with_scorer("quality", Arc::new(FixedScorer(1.0)))
        .with_model("good", ScriptedModelClient::new())
        .with_model("slow", ScriptedModelClient::new().hanging())
        .build();

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["good", "slow"], ["quality"]))
        .await
        .unwrap();
    assert_eq!(engine.manager.wait(run_id).await.unwrap(), RunStatus::Partial);

    let results = engine.manager.get_run_results(run_id).unwrap();
    assert_eq!(results.len(), 4);

    let slow: Vec<_> = results
        .iter()
        .filter(|s| s.attempt.model_id.as_str() == "slow")
        .collect();
    assert_eq!(slow.len(), 2);
    for scored in slow {
        // one execution plus three retries
        assert_eq!(scored.attempt.attempt_number, 4);
        assert_eq!(scored.attempt.retry_errors.len(), 3);
        let error = scored.attempt.error.as_ref().unwrap();
        assert_eq!(error.code, "TIMEOUT");
        assert_eq!(error.category, ErrorCategory::Transient);
        assert!(scored.metric_scores.is_empty());
    }

    let summary = engine.manager.get_summary(run_id, SummaryMode::FinalOnly).unwrap();
    let slow_summary = &summary.model_summaries[&ModelId::from("slow")];
    assert!(slow_summary.no_successful_attempts);
    assert_eq!(slow_summary.failure_count, 2);
    assert_eq!(slow_summary.avg_latency, 0.0);
    assert_eq!(slow_summary.metric_scores[&MetricId::from("quality")], 0.0);

    let good_summary = &summary.model_summaries[&ModelId::from("good")];
    assert_eq!(good_summary.success_count, 2);
    assert_eq!(good_summary.metric_scores[&MetricId::from("quality")], 1.0);
}

#[tokio::test(start_paused = true)]
async fn test_transient_error_is_retried_to_success() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 3))
        .with_scorer("quality", Arc::new(FixedScorer(0.5)))
        .with_model(
            "flaky",
            ScriptedModelClient::new()
                .failing_first_for_all(vec![ModelError::RateLimited("slow down".into())]),
        )
        .build();

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["flaky"], ["quality"]))
        .await
        .unwrap();
    assert_eq!(engine.manager.wait(run_id).await.unwrap(), RunStatus::Completed);

    let results = engine.manager.get_run_results(run_id).unwrap();
    assert_eq!(results.len(), 3);
    for scored in &results {
        assert!(scored.attempt.is_success());
        assert_eq!(scored.attempt.attempt_number, 2);
        assert_eq!(scored.attempt.retry_errors.len(), 1);
        assert_eq!(scored.attempt.retry_errors[0].code, "RATE_LIMITED");
    }
    assert_eq!(engine.client("flaky").call_count(), 6);
    assert_eq!(engine.client("flaky").overlapping_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_error_is_not_retried() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 2))
        .with_scorer("quality", Arc::new(FixedScorer(0.5)))
        .with_model(
            "locked",
            ScriptedModelClient::new().always_failing(ModelError::Authentication("bad key".into())),
        )
        .build();

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["locked"], ["quality"]))
        .await
        .unwrap();
    assert_eq!(engine.manager.wait(run_id).await.unwrap(), RunStatus::Partial);

    for scored in engine.manager.get_run_results(run_id).unwrap() {
        assert_eq!(scored.attempt.attempt_number, 1);
        assert!(scored.attempt.retry_errors.is_empty());
        assert_eq!(
            scored.attempt.error.as_ref().unwrap().category,
            ErrorCategory::Permanent
        );
    }
    assert_eq!(engine.client("locked").call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_lets_in_flight_attempts_finish_within_grace() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 10))
        .with_scorer("quality", Arc::new(FixedScorer(1.0)))
        .with_model(
            "m",
            ScriptedModelClient::new().with_latency(Duration::from_secs(1)),
        )
        .build();

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m"], ["quality"]))
        .await
        .unwrap();

    // two pairs finished, two more in flight
    tokio::time::sleep(Duration::from_millis(1_500)).await;
    engine.manager.cancel(run_id).await.unwrap();
    assert!(engine.manager.get_run(run_id).unwrap().cancelled);

    assert_eq!(engine.manager.wait(run_id).await.unwrap(), RunStatus::Partial);

    let results = engine.manager.get_run_results(run_id).unwrap();
    assert_eq!(results.len(), 4);
    assert!(results.iter().all(|s| s.attempt.is_success()));
    assert_eq!(engine.client("m").call_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_aborts_in_flight_attempts_after_grace() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 4))
        .with_scorer("quality", Arc::new(FixedScorer(1.0)))
        .configure(|config| config.dispatch.request_timeout_secs = 600)
        .with_model("stuck", ScriptedModelClient::new().hanging())
        .build();

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["stuck"], ["quality"]))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    let cancelled_at = Instant::now();
    engine.manager.cancel(run_id).await.unwrap();

    assert_eq!(engine.manager.wait(run_id).await.unwrap(), RunStatus::Partial);
    let grace = Duration::from_secs(engine.manager.config().cancellation.grace_period_secs);
    assert!(cancelled_at.elapsed() <= grace + Duration::from_millis(100));

    // only the two in-flight pairs were recorded, both as cancelled
    let results = engine.manager.get_run_results(run_id).unwrap();
    assert_eq!(results.len(), 2);
    for scored in &results {
        assert_eq!(scored.attempt.status, AttemptStatus::Failed);
        assert_eq!(
            scored.attempt.error.as_ref().unwrap().category,
            ErrorCategory::Cancelled
        );
    }
    assert_eq!(engine.client("stuck").in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_is_idempotent_and_ignores_finished_runs() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 1))
        .with_model("m", ScriptedModelClient::new())
        .build();

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m"], ["length"]))
        .await
        .unwrap();
    assert_eq!(engine.manager.wait(run_id).await.unwrap(), RunStatus::Completed);

    engine.manager.cancel(run_id).await.unwrap();
    engine.manager.cancel(run_id).await.unwrap();
    assert_eq!(engine.manager.get_status(run_id).unwrap(), RunStatus::Completed);
    assert!(!engine.manager.get_run(run_id).unwrap().cancelled);

    assert!(matches!(
        engine.manager.cancel(RunId::new()).await,
        Err(EvalError::Run(RunError::NotFound(_)))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_total_cost_is_api_plus_infrastructure() {
    let pricing = Pricing {
        prompt_price_per_1k: 1.0,
        completion_price_per_1k: 2.0,
        input_price_per_1k: 0.5,
        output_price_per_1k: 0.25,
    };
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 3))
        .with_model(
            "mixed",
            ScriptedModelClient::new()
                .with_response("three word answer")
                .with_pricing(pricing),
        )
        .build();

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["mixed"], ["length"]))
        .await
        .unwrap();
    engine.manager.wait(run_id).await.unwrap();

    let results = engine.manager.get_run_results(run_id).unwrap();
    let api: f64 = results.iter().map(|s| s.attempt.api_cost).sum();
    let infra: f64 = results.iter().map(|s| s.attempt.infrastructure_cost).sum();
    assert!(api > 0.0 && infra > 0.0);

    let summary = engine.manager.get_summary(run_id, SummaryMode::FinalOnly).unwrap();
    let model = &summary.model_summaries[&ModelId::from("mixed")];
    assert!((model.total_api_cost - api).abs() < 1e-12);
    assert!((model.total_infrastructure_cost - infra).abs() < 1e-12);
    assert_eq!(model.total_cost, model.total_api_cost + model.total_infrastructure_cost);
    assert!((model.avg_cost - model.total_cost / 3.0).abs() < 1e-12);
    assert_eq!(model.metric_scores[&MetricId::from("length")], 3.0);
}

#[tokio::test(start_paused = true)]
async fn test_configuration_error_fails_run_but_returns_id() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 2))
        .with_model("m", ScriptedModelClient::new())
        .build();

    let missing_dataset = engine
        .manager
        .start_evaluation(create_test_request("nope", ["m"], ["length"]))
        .await
        .unwrap();
    let run = engine.manager.get_run(missing_dataset).unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.failure_reason.unwrap().contains("nope"));
    assert!(run.started_at.is_none());

    match engine.manager.get_summary(missing_dataset, SummaryMode::AllowPartial) {
        Err(EvalError::Run(RunError::RunFailed { reason, .. })) => assert!(reason.contains("nope")),
        other => panic!("expected RunFailed, got {other:?}"),
    }

    let unknown_metric = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m"], ["telepathy"]))
        .await
        .unwrap();
    assert_eq!(engine.manager.get_status(unknown_metric).unwrap(), RunStatus::Failed);

    let unknown_model = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m", "ghost"], ["length"]))
        .await
        .unwrap();
    assert_eq!(engine.manager.get_status(unknown_model).unwrap(), RunStatus::Failed);

    // nothing was dispatched for any of them
    assert_eq!(engine.client("m").call_count(), 0);
    assert!(engine.manager.get_run_results(unknown_model).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_is_rejected() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 1))
        .build();

    let no_models: [&str; 0] = [];
    let result = engine
        .manager
        .start_evaluation(create_test_request("qa", no_models, ["length"]))
        .await;
    assert!(matches!(result, Err(EvalError::Validation(_))));
    assert!(engine.manager.list_runs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dataset_defaults_are_limited_to_registered_scorers() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 1))
        .with_model("m", ScriptedModelClient::new())
        .build();

    let no_metrics: [&str; 0] = [];
    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m"], no_metrics))
        .await
        .unwrap();
    engine.manager.wait(run_id).await.unwrap();

    let run = engine.manager.get_run(run_id).unwrap();
    let metrics: Vec<&str> = run.metric_ids.iter().map(|m| m.as_str()).collect();
    assert_eq!(metrics, vec!["conciseness", "f1"]);
}

#[tokio::test(start_paused = true)]
async fn test_summary_readiness() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 2))
        .with_model("m", ScriptedModelClient::new().with_latency(Duration::from_secs(1)))
        .build();

    assert!(matches!(
        engine.manager.get_summary(RunId::new(), SummaryMode::FinalOnly),
        Err(EvalError::Run(RunError::NotFound(_)))
    ));

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m"], ["length"]))
        .await
        .unwrap();
    assert_eq!(engine.manager.get_status(run_id).unwrap(), RunStatus::Running);

    assert!(matches!(
        engine.manager.get_summary(run_id, SummaryMode::FinalOnly),
        Err(EvalError::Run(RunError::NotReady { status: RunStatus::Running, .. }))
    ));
    let partial = engine.manager.get_summary(run_id, SummaryMode::AllowPartial).unwrap();
    assert_eq!(partial.model_summaries[&ModelId::from("m")].attempt_count, 0);

    engine.manager.wait(run_id).await.unwrap();
    let summary = engine.manager.get_summary(run_id, SummaryMode::FinalOnly).unwrap();
    assert_eq!(summary.model_summaries[&ModelId::from("m")].success_count, 2);
    assert_eq!(
        engine.manager.get_summary(run_id, SummaryMode::AllowPartial).unwrap(),
        summary
    );
}

#[tokio::test(start_paused = true)]
async fn test_scorer_failure_records_null_score() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 2))
        .with_scorer("broken", Arc::new(FailingScorer))
        .with_scorer("nan", Arc::new(FixedScorer(f64::NAN)))
        .with_model("m", ScriptedModelClient::new())
        .build();

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m"], ["broken", "nan", "length"]))
        .await
        .unwrap();
    assert_eq!(engine.manager.wait(run_id).await.unwrap(), RunStatus::Completed);

    for scored in engine.manager.get_run_results(run_id).unwrap() {
        assert_eq!(scored.score("broken"), None);
        assert_eq!(scored.score("nan"), None);
        assert_eq!(scored.score("length"), Some(2.0));
        assert!(scored.scorer_errors.contains_key("broken"));
    }

    let summary = engine.manager.get_summary(run_id, SummaryMode::FinalOnly).unwrap();
    let model = &summary.model_summaries[&ModelId::from("m")];
    assert_eq!(model.metric_scores[&MetricId::from("broken")], 0.0);
    assert_eq!(model.metric_scores[&MetricId::from("nan")], 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_events_bracket_the_run() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 2))
        .with_model("m", ScriptedModelClient::new())
        .build();
    let mut events = engine.manager.subscribe();

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m"], ["length"]))
        .await
        .unwrap();
    engine.manager.wait(run_id).await.unwrap();

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }

    assert!(matches!(
        received.first(),
        Some(RunEvent::RunStarted { task_count: 2, model_count: 1, .. })
    ));
    assert!(matches!(
        received.last(),
        Some(RunEvent::RunFinished { status: RunStatus::Completed, .. })
    ));
    let finished = received
        .iter()
        .filter(|e| matches!(e, RunEvent::AttemptFinished { .. }))
        .count();
    assert_eq!(finished, 2);
    assert!(received.iter().all(|e| e.run_id() == run_id));
}

#[tokio::test(start_paused = true)]
async fn test_list_runs_newest_first() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 1))
        .with_model("m", ScriptedModelClient::new())
        .build();

    let first = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m"], ["length"]))
        .await
        .unwrap();
    engine.manager.wait(first).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m"], ["length"]))
        .await
        .unwrap();
    engine.manager.wait(second).await.unwrap();

    let runs = engine.manager.list_runs();
    assert_eq!(runs.len(), 2);
    assert!(runs[0].created_at >= runs[1].created_at);
    assert!(runs.iter().any(|r| r.run_id == first));
    assert!(runs.iter().all(|r| r.status == RunStatus::Completed));
}

#[tokio::test(start_paused = true)]
async fn test_generate_response() {
    let engine = EngineBuilder::new()
        .with_model(
            "m",
            ScriptedModelClient::new()
                .with_response("hello there")
                .with_latency(Duration::from_secs(2)),
        )
        .build();

    let response = engine
        .manager
        .generate_response(&ModelId::from("m"), "hi")
        .await
        .unwrap();
    assert_eq!(response.response, "hello there");
    assert_eq!(response.token_count, 2);
    assert_eq!(response.tokens_per_second, 1.0);
    assert_eq!(response.latency_seconds, 2.0);

    assert!(matches!(
        engine.manager.generate_response(&ModelId::from("ghost"), "hi").await,
        Err(EvalError::Configuration(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_runs_share_model_limit() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 6))
        .with_model(
            "m",
            ScriptedModelClient::new().with_latency(Duration::from_secs(1)),
        )
        .build();

    let first = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m"], ["length"]))
        .await
        .unwrap();
    let second = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m"], ["length"]))
        .await
        .unwrap();

    assert_eq!(engine.manager.wait(first).await.unwrap(), RunStatus::Completed);
    assert_eq!(engine.manager.wait(second).await.unwrap(), RunStatus::Completed);

    // per-model limit 2 holds across both runs
    let client = engine.client("m");
    assert_eq!(client.call_count(), 12);
    assert!(client.max_in_flight() <= 2, "in flight: {}", client.max_in_flight());
}

// Real clock: attempt timestamps come from the wall clock
#[tokio::test]
async fn test_attempt_start_excludes_time_queued_for_permits() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 2))
        .with_descriptor(
            create_test_descriptor("serial").with_max_concurrency(1),
            ScriptedModelClient::new().with_latency(Duration::from_millis(100)),
        )
        .build();

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["serial"], ["length"]))
        .await
        .unwrap();
    engine.manager.wait(run_id).await.unwrap();

    let mut starts: Vec<_> = engine
        .manager
        .get_run_results(run_id)
        .unwrap()
        .into_iter()
        .map(|s| s.attempt.started_at)
        .collect();
    starts.sort();
    assert_eq!(starts.len(), 2);
    assert!(starts[1] - starts[0] >= chrono::Duration::milliseconds(90));
}

#[tokio::test(start_paused = true)]
async fn test_forget_drops_only_terminal_runs() {
    let engine = EngineBuilder::new()
        .with_dataset(create_test_dataset("qa", 2))
        .with_model(
            "m",
            ScriptedModelClient::new().with_latency(Duration::from_secs(1)),
        )
        .build();

    let run_id = engine
        .manager
        .start_evaluation(create_test_request("qa", ["m"], ["length"]))
        .await
        .unwrap();
    assert!(matches!(
        engine.manager.forget(run_id),
        Err(EvalError::Run(RunError::NotReady { .. }))
    ));

    engine.manager.wait(run_id).await.unwrap();
    engine.manager.forget(run_id).unwrap();

    assert!(engine.manager.list_runs().is_empty());
    assert!(engine.manager.collector().snapshot(run_id).is_empty());
    assert!(matches!(
        engine.manager.get_run(run_id),
        Err(EvalError::Run(RunError::NotFound(_)))
    ));
}
