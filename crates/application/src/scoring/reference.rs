//! Reference scorers.
//!
//! Simple lexical scorers that need nothing but the response and the task.
//! Model-judged metrics (faithfulness, hallucination, ...) are plugged in by
//! registering further [`MetricScorer`]s.

use crate::ports::MetricScorer;
use async_trait::async_trait;
use llm_eval_domain::{ScorerError, Task};
use std::collections::HashMap;
use tracing::{debug, instrument};

fn reference(task: &Task) -> Result<&str, ScorerError> {
    task.reference.as_deref().ok_or(ScorerError::MissingReference)
}

/// Lowercased alphanumeric tokens
fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// 1.0 when the response equals the reference, else 0.0.
#[derive(Debug, Clone)]
pub struct ExactMatchScorer {
    pub case_sensitive: bool,
    pub trim_whitespace: bool,
}

impl Default for ExactMatchScorer {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            trim_whitespace: true,
        }
    }
}

#[async_trait]
impl MetricScorer for ExactMatchScorer {
    #[instrument(skip_all, fields(task_id = %task.task_id))]
    async fn score(&self, response: &str, task: &Task) -> Result<f64, ScorerError> {
        let expected = reference(task)?;

        let (actual, expected) = if self.trim_whitespace {
            (response.trim(), expected.trim())
        } else {
            (response, expected)
        };

        let matches = if self.case_sensitive {
            actual == expected
        } else {
            actual.to_lowercase() == expected.to_lowercase()
        };

        debug!(matches, "Exact match");
        Ok(if matches { 1.0 } else { 0.0 })
    }

    fn name(&self) -> &'static str {
        "exact_match"
    }
}

/// 1.0 when the response contains the reference (case-insensitive), else 0.0.
#[derive(Debug, Clone, Default)]
pub struct ContainsScorer;

#[async_trait]
impl MetricScorer for ContainsScorer {
    async fn score(&self, response: &str, task: &Task) -> Result<f64, ScorerError> {
        let expected = reference(task)?.trim().to_lowercase();
        if expected.is_empty() {
            return Err(ScorerError::MissingReference);
        }
        Ok(if response.to_lowercase().contains(&expected) {
            1.0
        } else {
            0.0
        })
    }

    fn name(&self) -> &'static str {
        "contains"
    }
}

/// Token-overlap F1 between response and reference.
#[derive(Debug, Clone, Default)]
pub struct TokenF1Scorer;

impl TokenF1Scorer {
    pub fn f1(response: &str, reference: &str) -> f64 {
        let predicted = tokenize(response);
        let expected = tokenize(reference);

        if predicted.is_empty() && expected.is_empty() {
            return 1.0;
        }
        if predicted.is_empty() || expected.is_empty() {
            return 0.0;
        }

        let mut counts: HashMap<&str, usize> = HashMap::new();
        for token in &expected {
            *counts.entry(token.as_str()).or_default() += 1;
        }

        let mut common = 0usize;
        for token in &predicted {
            if let Some(count) = counts.get_mut(token.as_str()) {
                if *count > 0 {
                    *count -= 1;
                    common += 1;
                }
            }
        }

        if common == 0 {
            return 0.0;
        }

        let precision = common as f64 / predicted.len() as f64;
        let recall = common as f64 / expected.len() as f64;
        2.0 * precision * recall / (precision + recall)
    }
}

#[async_trait]
impl MetricScorer for TokenF1Scorer {
    #[instrument(skip_all, fields(task_id = %task.task_id))]
    async fn score(&self, response: &str, task: &Task) -> Result<f64, ScorerError> {
        let score = Self::f1(response, reference(task)?);
        debug!(score, "Token F1");
        Ok(score)
    }

    fn name(&self) -> &'static str {
        "token_f1"
    }
}

/// Rewards short answers.
///
/// With a reference, the score is `reference_words / response_words` capped at
/// 1.0. Without one, responses up to `target_words` score 1.0 and longer ones
/// decay as `target_words / response_words`.
#[derive(Debug, Clone)]
pub struct ConcisenessScorer {
    pub target_words: usize,
}

impl Default for ConcisenessScorer {
    fn default() -> Self {
        Self { target_words: 100 }
    }
}

#[async_trait]
impl MetricScorer for ConcisenessScorer {
    async fn score(&self, response: &str, task: &Task) -> Result<f64, ScorerError> {
        let words = response.split_whitespace().count();
        if words == 0 {
            return Ok(0.0);
        }

        let budget = match task.reference.as_deref() {
            Some(reference) => reference.split_whitespace().count().max(1),
            None => self.target_words.max(1),
        };

        Ok((budget as f64 / words as f64).min(1.0))
    }

    fn name(&self) -> &'static str {
        "conciseness"
    }
}

/// Response length in words.
#[derive(Debug, Clone, Default)]
pub struct LengthScorer;

#[async_trait]
impl MetricScorer for LengthScorer {
    async fn score(&self, response: &str, _task: &Task) -> Result<f64, ScorerError> {
        Ok(response.split_whitespace().count() as f64)
    }

    fn name(&self) -> &'static str {
        "length"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(reference: Option<&str>) -> Task {
        let task = Task::new("t1", "What is the capital of France?");
        match reference {
            Some(r) => task.with_reference(r),
            None => task,
        }
    }

    #[tokio::test]
    async fn test_exact_match() {
        let scorer = ExactMatchScorer::default();
        assert_eq!(scorer.score("  Paris ", &task(Some("paris"))).await, Ok(1.0));
        assert_eq!(scorer.score("Lyon", &task(Some("Paris"))).await, Ok(0.0));

        let strict = ExactMatchScorer {
            case_sensitive: true,
            trim_whitespace: true,
        };
        assert_eq!(strict.score("paris", &task(Some("Paris"))).await, Ok(0.0));
    }

    #[tokio::test]
    async fn test_missing_reference_is_an_error() {
        assert_eq!(
            ExactMatchScorer::default().score("Paris", &task(None)).await,
            Err(ScorerError::MissingReference)
        );
        assert_eq!(
            TokenF1Scorer.score("Paris", &task(None)).await,
            Err(ScorerError::MissingReference)
        );
    }

    #[tokio::test]
    async fn test_contains() {
        let scorer = ContainsScorer;
        assert_eq!(
            scorer.score("The capital is Paris.", &task(Some("paris"))).await,
            Ok(1.0)
        );
        assert_eq!(scorer.score("It is Lyon.", &task(Some("Paris"))).await, Ok(0.0));
    }

    #[test]
    fn test_token_f1() {
        assert_eq!(TokenF1Scorer::f1("Paris", "Paris"), 1.0);
        assert_eq!(TokenF1Scorer::f1("Lyon", "Paris"), 0.0);
        assert_eq!(TokenF1Scorer::f1("", ""), 1.0);

        // precision 1/3, recall 1/1
        let score = TokenF1Scorer::f1("it is Paris", "Paris");
        assert!((score - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_conciseness() {
        let scorer = ConcisenessScorer { target_words: 4 };
        assert_eq!(scorer.score("one two", &task(None)).await, Ok(1.0));
        assert_eq!(scorer.score("a b c d e f g h", &task(None)).await, Ok(0.5));
        assert_eq!(scorer.score("Paris is the capital", &task(Some("Paris"))).await, Ok(0.25));
        assert_eq!(scorer.score("", &task(None)).await, Ok(0.0));
    }

    #[tokio::test]
    async fn test_length() {
        assert_eq!(LengthScorer.score("a b  c", &task(None)).await, Ok(3.0));
    }
}
