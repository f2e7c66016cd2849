//! Result collector: the append-only, per-run result log.

use indexmap::IndexMap;
use llm_eval_domain::{AttemptKey, CollectorError, RunId, ScoredAttempt};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
struct RunLog {
    entries: IndexMap<AttemptKey, ScoredAttempt>,
    sealed: bool,
}

/// Holds the scored attempts of every run, in insertion order.
///
/// Safe to share between concurrent writers. A duplicate attempt key is
/// rejected, and a sealed log rejects every append.
#[derive(Debug, Default)]
pub struct ResultCollector {
    logs: RwLock<HashMap<RunId, RunLog>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty log for `run_id` if it has none yet.
    pub fn open(&self, run_id: RunId) {
        self.logs.write().entry(run_id).or_default();
    }

    /// Append a scored attempt to its run's log.
    pub fn record(&self, scored: ScoredAttempt) -> Result<(), CollectorError> {
        let key = scored.key();
        let mut logs = self.logs.write();
        let log = logs.entry(key.run_id).or_default();

        if log.sealed {
            return Err(CollectorError::Sealed(key.run_id));
        }
        if log.entries.contains_key(&key) {
            return Err(CollectorError::Duplicate {
                task_id: key.task_id,
                model_id: key.model_id,
                attempt_number: key.attempt_number,
            });
        }

        debug!(
            run_id = %key.run_id,
            task_id = %key.task_id,
            model_id = %key.model_id,
            "Recorded attempt"
        );
        log.entries.insert(key, scored);
        Ok(())
    }

    /// Point-in-time copy of a run's log in insertion order. Unknown runs
    /// yield an empty log.
    pub fn snapshot(&self, run_id: RunId) -> Vec<ScoredAttempt> {
        self.logs
            .read()
            .get(&run_id)
            .map(|log| log.entries.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Reject every further append to `run_id`.
    pub fn seal(&self, run_id: RunId) {
        self.logs.write().entry(run_id).or_default().sealed = true;
    }

    /// Drop a run's log. Returns whether one existed.
    pub fn remove(&self, run_id: RunId) -> bool {
        self.logs.write().remove(&run_id).is_some()
    }

    pub fn is_sealed(&self, run_id: RunId) -> bool {
        self.logs
            .read()
            .get(&run_id)
            .map(|log| log.sealed)
            .unwrap_or(false)
    }

    pub fn len(&self, run_id: RunId) -> usize {
        self.logs
            .read()
            .get(&run_id)
            .map(|log| log.entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, run_id: RunId) -> bool {
        self.len(run_id) == 0
    }
}
