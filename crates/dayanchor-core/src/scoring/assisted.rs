//! Language-model-assisted scoring with per-pair deterministic fallback.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Candidate, DeterministicScorer, MatchScore, ScoreFactor, ScoreSource, ScoringStrategy};
use crate::provider::{parse_pair_verdict, prompt, ProviderPool};

/// Asks the scoring provider about every pair it is given.
#[derive(Clone)]
pub struct ModelAssistedScorer {
    pool: Arc<ProviderPool>,
    fallback: DeterministicScorer,
    timeout: Duration,
}

impl ModelAssistedScorer {
    pub fn new(pool: Arc<ProviderPool>, fallback: DeterministicScorer, timeout: Duration) -> Self {
        Self {
            pool,
            fallback,
            timeout,
        }
    }

    /// Score one pair, falling back to the deterministic score on any failure.
    pub async fn score(&self, run_id: Uuid, candidate: &Candidate<'_>) -> MatchScore {
        let baseline = self.fallback.score(candidate.task, candidate.slot);
        self.rescore(run_id, candidate, baseline).await
    }

    /// Replace `baseline` with the provider's verdict when it is valid.
    pub async fn rescore(
        &self,
        run_id: Uuid,
        candidate: &Candidate<'_>,
        baseline: MatchScore,
    ) -> MatchScore {
        let request =
            prompt::pair_score_request(run_id, candidate.task, candidate.slot, &candidate.placement);

        let verdict = match self.pool.call(&request, self.timeout).await {
            Ok(raw) => parse_pair_verdict(&raw),
            Err(e) => Err(e),
        };

        match verdict {
            Ok(verdict) => {
                debug!(
                    run_id = %run_id,
                    task_id = %candidate.task.id,
                    slot_id = %candidate.slot.id,
                    confidence = verdict.confidence,
                    "model score accepted"
                );
                let mut factors = baseline.factors;
                factors.push(ScoreFactor::new("model_confidence", 1.0, verdict.confidence));
                MatchScore {
                    task_id: baseline.task_id,
                    slot_id: baseline.slot_id,
                    score: verdict.confidence,
                    rationale: verdict.rationale,
                    factors,
                    source: ScoreSource::Model,
                }
            }
            Err(e) => {
                warn!(
                    run_id = %run_id,
                    task_id = %candidate.task.id,
                    slot_id = %candidate.slot.id,
                    error = %e,
                    "scoring provider failed, using deterministic score"
                );
                baseline.into_fallback()
            }
        }
    }
}

#[async_trait]
impl ScoringStrategy for ModelAssistedScorer {
    fn name(&self) -> &'static str {
        "model_assisted"
    }

    async fn score_all(&self, run_id: Uuid, candidates: &[Candidate<'_>]) -> Vec<MatchScore> {
        join_all(candidates.iter().map(|c| self.score(run_id, c))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{CompletionRequest, ScoringProvider};
    use crate::scoring::feasible_candidates;
    use crate::task::Task;
    use crate::timeline::{CandidateSlot, Gap};
    use chrono::NaiveDate;

    struct FixedProvider(&'static str);

    #[async_trait]
    impl ScoringProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ScoringProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            Err(ProviderError::Status {
                code: 503,
                body: "unavailable".to_string(),
            })
        }
    }

    fn fixture() -> (Vec<Task>, Vec<CandidateSlot>) {
        let day = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let slot = CandidateSlot::from_gap(
            0,
            &Gap {
                start: day.and_hms_opt(8, 0, 0).unwrap(),
                end: day.and_hms_opt(9, 0, 0).unwrap(),
            },
        );
        (vec![Task::new("t1", "Walk", 20)], vec![slot])
    }

    fn scorer(provider: Arc<dyn ScoringProvider>) -> ModelAssistedScorer {
        ModelAssistedScorer::new(
            Arc::new(ProviderPool::new(provider, 2)),
            DeterministicScorer::new(),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn uses_valid_model_verdict() {
        let (tasks, slots) = fixture();
        let candidates = feasible_candidates(&tasks, &slots);
        let scorer = scorer(Arc::new(FixedProvider(
            r#"{"confidence": 0.91, "rationale": "Morning walk before work"}"#,
        )));

        let scores = scorer.score_all(Uuid::new_v4(), &candidates).await;
        assert_eq!(scores[0].source, ScoreSource::Model);
        assert_eq!(scores[0].score, 0.91);
        assert_eq!(scores[0].rationale, "Morning walk before work");
        assert!(scores[0].factors.iter().any(|f| f.name == "model_confidence"));
    }

    #[tokio::test]
    async fn malformed_verdict_falls_back() {
        let (tasks, slots) = fixture();
        let candidates = feasible_candidates(&tasks, &slots);
        let scorer = scorer(Arc::new(FixedProvider(r#"{"confidence": 7}"#)));

        let score = scorer.score(Uuid::new_v4(), &candidates[0]).await;
        let expected = DeterministicScorer::new().score(&tasks[0], &slots[0]);
        assert_eq!(score.source, ScoreSource::Fallback);
        assert_eq!(score.score, expected.score);
    }

    #[tokio::test]
    async fn provider_error_falls_back() {
        let (tasks, slots) = fixture();
        let candidates = feasible_candidates(&tasks, &slots);
        let scorer = scorer(Arc::new(FailingProvider));

        let score = scorer.score(Uuid::new_v4(), &candidates[0]).await;
        assert_eq!(score.source, ScoreSource::Fallback);
    }
}
