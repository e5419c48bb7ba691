//! Match scoring for (task, slot) pairs.
//!
//! Three interchangeable strategies implement [`ScoringStrategy`]:
//!
//! | Strategy | Provider calls | Fallback |
//! |----------|----------------|----------|
//! | [`DeterministicScorer`] | none | n/a |
//! | [`ModelAssistedScorer`] | one per feasible pair | deterministic score per pair |
//! | [`HybridScorer`] | top-K pairs per task | deterministic score per pair |
//!
//! Only feasible pairs (the task fits inside the slot) are ever scored by
//! the pipeline; see [`feasible_candidates`].

mod assisted;
mod deterministic;
mod hybrid;

pub use assisted::ModelAssistedScorer;
pub use deterministic::DeterministicScorer;
pub use hybrid::HybridScorer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::task::Task;
use crate::timeline::{CandidateSlot, Placement};

/// Where a score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Deterministic,
    Model,
    /// Deterministic score used because the provider failed
    Fallback,
}

/// Individual scoring term with weight and value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactor {
    pub name: String,
    /// Weight for this term (0.0 to 1.0)
    pub weight: f64,
    /// Raw value (0.0 to 1.0, higher is better)
    pub value: f64,
    /// Weighted contribution to the final score
    pub contribution: f64,
}

impl ScoreFactor {
    pub fn new(name: impl Into<String>, weight: f64, value: f64) -> Self {
        let weight = weight.clamp(0.0, 1.0);
        let value = value.clamp(0.0, 1.0);
        Self {
            name: name.into(),
            weight,
            value,
            contribution: weight * value,
        }
    }

    /// Scale the contribution by a multiplier (e.g. priority weight).
    pub fn scaled(mut self, multiplier: f64) -> Self {
        self.contribution *= multiplier;
        self
    }
}

/// Score for one (task, slot) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub task_id: String,
    pub slot_id: String,
    /// Final score in [0, 1]
    pub score: f64,
    pub rationale: String,
    pub factors: Vec<ScoreFactor>,
    pub source: ScoreSource,
}

impl MatchScore {
    /// Mark a deterministic score as the fallback for a failed provider call.
    pub fn into_fallback(mut self) -> Self {
        self.source = ScoreSource::Fallback;
        self
    }

    /// Get the top contributing factor
    pub fn top_factor(&self) -> Option<&ScoreFactor> {
        self.factors
            .iter()
            .max_by(|a, b| a.contribution.total_cmp(&b.contribution))
    }
}

/// A feasible (task, slot) pair together with the task's placement.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub task: &'a Task,
    pub slot: &'a CandidateSlot,
    pub placement: Placement,
}

/// Every (task, slot) pair where the task fits, in task-major order.
pub fn feasible_candidates<'a>(tasks: &'a [Task], slots: &'a [CandidateSlot]) -> Vec<Candidate<'a>> {
    tasks
        .iter()
        .flat_map(|task| {
            slots.iter().filter_map(move |slot| {
                slot.placement_for(task).map(|placement| Candidate {
                    task,
                    slot,
                    placement,
                })
            })
        })
        .collect()
}

/// Common contract for scoring strategies.
///
/// Implementations return one score per candidate, in candidate order. They
/// never fail: provider problems are absorbed and replaced by deterministic
/// scores.
#[async_trait]
pub trait ScoringStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn score_all(&self, run_id: Uuid, candidates: &[Candidate<'_>]) -> Vec<MatchScore>;
}
