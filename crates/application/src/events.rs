//! Run events for progressive reporting.

use async_trait::async_trait;
use llm_eval_domain::{AttemptError, AttemptStatus, EvalError, ModelId, RunId, RunStatus, TaskId};
use serde::Serialize;
use tokio::sync::broadcast;

/// Something observable happened in a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        run_id: RunId,
        task_count: usize,
        model_count: usize,
    },
    AttemptStarted {
        run_id: RunId,
        task_id: TaskId,
        model_id: ModelId,
        attempt_number: u32,
    },
    AttemptRetrying {
        run_id: RunId,
        task_id: TaskId,
        model_id: ModelId,
        attempt_number: u32,
        error: AttemptError,
        delay_ms: u64,
    },
    AttemptFinished {
        run_id: RunId,
        task_id: TaskId,
        model_id: ModelId,
        attempt_number: u32,
        status: AttemptStatus,
    },
    RunCancelled {
        run_id: RunId,
    },
    RunFinished {
        run_id: RunId,
        status: RunStatus,
    },
}

impl RunEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::AttemptStarted { run_id, .. }
            | Self::AttemptRetrying { run_id, .. }
            | Self::AttemptFinished { run_id, .. }
            | Self::RunCancelled { run_id }
            | Self::RunFinished { run_id, .. } => *run_id,
        }
    }
}

/// Event publisher trait for run events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: RunEvent) -> Result<(), EvalError>;
}

/// No-op event publisher for testing
pub struct NoOpEventPublisher;

#[async_trait]
impl EventPublisher for NoOpEventPublisher {
    async fn publish(&self, _event: RunEvent) -> Result<(), EvalError> {
        Ok(())
    }
}

/// Fans events out to any number of subscribers.
///
/// Slow subscribers lose the oldest events rather than blocking the run.
pub struct BroadcastEventPublisher {
    sender: broadcast::Sender<RunEvent>,
}

impl BroadcastEventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastEventPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventPublisher for BroadcastEventPublisher {
    async fn publish(&self, event: RunEvent) -> Result<(), EvalError> {
        // Having no subscribers is fine
        let _ = self.sender.send(event);
        Ok(())
    }
}
