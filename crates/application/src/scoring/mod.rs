//! Scorer registry and reference scorers.

pub mod reference;
mod registry;

pub use reference::{ConcisenessScorer, ContainsScorer, ExactMatchScorer, LengthScorer, TokenF1Scorer};
pub use registry::{ScorerRegistry, ScorerRegistryBuilder};
