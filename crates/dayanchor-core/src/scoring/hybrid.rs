//! Deterministic-first scoring with model re-ranking of the top-K pairs.
//!
//! Provider usage is bounded by `top_k × tasks`, independent of how many
//! slots the day has.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::debug;
use uuid::Uuid;

use super::{Candidate, DeterministicScorer, MatchScore, ModelAssistedScorer, ScoringStrategy};

pub struct HybridScorer {
    deterministic: DeterministicScorer,
    assisted: ModelAssistedScorer,
    top_k: usize,
}

impl HybridScorer {
    pub fn new(deterministic: DeterministicScorer, assisted: ModelAssistedScorer, top_k: usize) -> Self {
        Self {
            deterministic,
            assisted,
            top_k,
        }
    }

    /// Indices of the best `top_k` candidates per task by deterministic score.
    ///
    /// Ties are broken by slot id so the selection is reproducible.
    fn top_k_indices(&self, candidates: &[Candidate<'_>], scores: &[MatchScore]) -> Vec<usize> {
        let mut per_task: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, c) in candidates.iter().enumerate() {
            per_task.entry(c.task.id.as_str()).or_default().push(i);
        }

        let mut selected: Vec<usize> = per_task
            .into_values()
            .flat_map(|mut indices| {
                indices.sort_by(|&a, &b| {
                    scores[b]
                        .score
                        .total_cmp(&scores[a].score)
                        .then_with(|| scores[a].slot_id.cmp(&scores[b].slot_id))
                });
                indices.truncate(self.top_k);
                indices
            })
            .collect();
        selected.sort_unstable();
        selected
    }
}

#[async_trait]
impl ScoringStrategy for HybridScorer {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    async fn score_all(&self, run_id: Uuid, candidates: &[Candidate<'_>]) -> Vec<MatchScore> {
        let mut scores = self.deterministic.score_all(run_id, candidates).await;
        let selected = self.top_k_indices(candidates, &scores);

        debug!(
            run_id = %run_id,
            pairs = candidates.len(),
            rescored = selected.len(),
            top_k = self.top_k,
            "re-ranking top candidates with scoring provider"
        );

        let rescored = join_all(
            selected
                .iter()
                .map(|&i| self.assisted.rescore(run_id, &candidates[i], scores[i].clone())),
        )
        .await;

        for (i, score) in selected.into_iter().zip(rescored) {
            scores[i] = score;
        }
        scores
    }
}
