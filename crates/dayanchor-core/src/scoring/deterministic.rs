//! Pure heuristic scoring.
//!
//! ```text
//! score = (0.4·duration_fit + 0.4·time_alignment + 0.2·containment) × priority_weight
//! ```
//!
//! - `duration_fit = max(0, 1 - |slot - task| / max(slot, task))`
//! - `time_alignment` is 1 inside the preferred window and decays linearly to
//!   0 over the grace period outside it; tasks without a window align anywhere
//! - `containment` is 1 when the whole task fits inside the slot. Runs only
//!   score pairs from [`feasible_candidates`](super::feasible_candidates), so
//!   there it is a constant `0.2 × priority_weight` offset rather than a third
//!   signal; it only varies when [`DeterministicScorer::score`] is called on
//!   a slot the task does not fit

use async_trait::async_trait;
use futures::future::join_all;
use tracing::warn;
use uuid::Uuid;

use super::{Candidate, MatchScore, ScoreFactor, ScoreSource, ScoringStrategy};
use crate::task::Task;
use crate::timeline::CandidateSlot;

const DURATION_FIT_WEIGHT: f64 = 0.4;
const TIME_ALIGNMENT_WEIGHT: f64 = 0.4;
const CONTAINMENT_WEIGHT: f64 = 0.2;

/// Deterministic, provider-free scorer.
#[derive(Debug, Clone)]
pub struct DeterministicScorer {
    grace_minutes: i64,
}

impl DeterministicScorer {
    /// Create with the default 60-minute grace period
    pub fn new() -> Self {
        Self { grace_minutes: 60 }
    }

    pub fn with_grace(mut self, minutes: i64) -> Self {
        self.grace_minutes = minutes.max(0);
        self
    }

    /// Score `task` in `slot`.
    pub fn score(&self, task: &Task, slot: &CandidateSlot) -> MatchScore {
        let placement = slot.placement_for(task);
        let start = placement.map(|p| p.start).unwrap_or(slot.start);

        let duration_fit = Self::duration_fit(slot.duration_minutes(), task.duration_minutes);
        let time_alignment = self.time_alignment(task, start.time());
        let containment = if placement.is_some() { 1.0 } else { 0.0 };
        let multiplier = task.priority.weight();

        let factors = vec![
            ScoreFactor::new("duration_fit", DURATION_FIT_WEIGHT, duration_fit).scaled(multiplier),
            ScoreFactor::new("time_alignment", TIME_ALIGNMENT_WEIGHT, time_alignment)
                .scaled(multiplier),
            ScoreFactor::new("containment", CONTAINMENT_WEIGHT, containment).scaled(multiplier),
        ];
        let score = factors
            .iter()
            .map(|f| f.contribution)
            .sum::<f64>()
            .clamp(0.0, 1.0);

        let rationale = format!(
            "duration fit {:.2}, time alignment {:.2}, {}; {:?} priority (x{:.1})",
            duration_fit,
            time_alignment,
            if placement.is_some() { "fits slot" } else { "does not fit slot" },
            task.priority,
            multiplier,
        );

        MatchScore {
            task_id: task.id.clone(),
            slot_id: slot.id.clone(),
            score,
            rationale,
            factors,
            source: ScoreSource::Deterministic,
        }
    }

    fn duration_fit(slot_minutes: i64, task_minutes: i64) -> f64 {
        let longest = slot_minutes.max(task_minutes) as f64;
        if longest <= 0.0 {
            return 0.0;
        }
        let diff = (slot_minutes - task_minutes).abs() as f64;
        (1.0 - diff / longest).max(0.0)
    }

    fn time_alignment(&self, task: &Task, start: chrono::NaiveTime) -> f64 {
        let Some(window) = task.preferred_window else {
            return 1.0;
        };

        let distance = window.distance_minutes(start);
        if distance == 0 {
            1.0
        } else if self.grace_minutes == 0 {
            0.0
        } else {
            (1.0 - distance as f64 / self.grace_minutes as f64).max(0.0)
        }
    }
}

impl Default for DeterministicScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScoringStrategy for DeterministicScorer {
    fn name(&self) -> &'static str {
        "deterministic"
    }

    /// Scores each task's row of candidates on the blocking pool, one worker
    /// per task, and returns the scores in candidate order.
    async fn score_all(&self, run_id: Uuid, candidates: &[Candidate<'_>]) -> Vec<MatchScore> {
        let rows: Vec<&[Candidate<'_>]> = candidates
            .chunk_by(|a, b| a.task.id == b.task.id)
            .collect();

        let workers = rows.iter().map(|row| {
            let scorer = self.clone();
            let task = row[0].task.clone();
            let slots: Vec<CandidateSlot> = row.iter().map(|c| c.slot.clone()).collect();
            tokio::task::spawn_blocking(move || {
                slots
                    .iter()
                    .map(|slot| scorer.score(&task, slot))
                    .collect::<Vec<_>>()
            })
        });
        let finished = join_all(workers).await;

        rows.iter()
            .zip(finished)
            .flat_map(|(row, joined)| match joined {
                Ok(scores) => scores,
                Err(e) => {
                    warn!(run_id = %run_id, error = %e, "scoring worker failed, scoring row inline");
                    row.iter().map(|c| self.score(c.task, c.slot)).collect()
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Priority;
    use crate::timeline::Gap;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn gap(start: NaiveDateTime, end: NaiveDateTime) -> CandidateSlot {
        CandidateSlot::from_gap(0, &Gap { start, end })
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn exact_fit_in_preferred_window_scores_full() {
        let scorer = DeterministicScorer::new();
        let task = Task::new("t", "Walk", 30)
            .with_priority(Priority::High)
            .with_preferred_window(t(8, 0), t(9, 0));
        let score = scorer.score(&task, &gap(at(8, 0), at(8, 30)));
        assert!(approx(score.score, 1.0));
        assert_eq!(score.source, ScoreSource::Deterministic);
    }

    #[test]
    fn duration_fit_penalizes_oversized_slots() {
        let scorer = DeterministicScorer::new();
        let task = Task::new("t", "Breathe", 15).with_priority(Priority::High);
        // 15 of 45 minutes: fit = 1 - 30/45
        let score = scorer.score(&task, &gap(at(8, 0), at(8, 45)));
        let expected = 0.4 * (1.0 - 30.0 / 45.0) + 0.4 + 0.2;
        assert!(approx(score.score, expected));
    }

    #[test]
    fn priority_scales_score() {
        let scorer = DeterministicScorer::new();
        let slot = gap(at(8, 0), at(8, 30));
        let high = Task::new("h", "Walk", 30).with_priority(Priority::High);
        let medium = high.clone().with_priority(Priority::Medium);
        let low = high.clone().with_priority(Priority::Low);

        assert!(approx(scorer.score(&high, &slot).score, 1.0));
        assert!(approx(scorer.score(&medium, &slot).score, 0.7));
        assert!(approx(scorer.score(&low, &slot).score, 0.4));
    }

    #[test]
    fn alignment_decays_over_grace_period() {
        let scorer = DeterministicScorer::new().with_grace(60);
        // Gap is too early for the window; placement clamps to 10:00
        let task = Task::new("t", "Yoga", 30)
            .with_priority(Priority::High)
            .with_preferred_window(t(11, 0), t(12, 0));
        let score = scorer.score(&task, &gap(at(9, 30), at(10, 30)));

        let alignment = score
            .factors
            .iter()
            .find(|f| f.name == "time_alignment")
            .unwrap();
        assert!(approx(alignment.value, 0.0));

        let closer = scorer.score(&task, &gap(at(10, 0), at(11, 0)));
        let alignment = closer
            .factors
            .iter()
            .find(|f| f.name == "time_alignment")
            .unwrap();
        // Placement at 10:30 is 30 minutes before the window
        assert!(approx(alignment.value, 0.5));
    }

    #[test]
    fn zero_grace_is_strict() {
        let scorer = DeterministicScorer::new().with_grace(0);
        let task = Task::new("t", "Yoga", 30).with_preferred_window(t(11, 0), t(12, 0));
        let score = scorer.score(&task, &gap(at(9, 0), at(9, 30)));
        let alignment = score
            .factors
            .iter()
            .find(|f| f.name == "time_alignment")
            .unwrap();
        assert_eq!(alignment.value, 0.0);
    }

    #[test]
    fn task_that_does_not_fit_loses_containment() {
        let scorer = DeterministicScorer::new();
        let task = Task::new("t", "Run", 60).with_priority(Priority::High);
        let score = scorer.score(&task, &gap(at(8, 0), at(8, 30)));
        let expected = 0.4 * 0.5 + 0.4;
        assert!(approx(score.score, expected));
        assert!(score.rationale.contains("does not fit"));
    }

    #[test]
    fn score_stays_in_unit_range() {
        let scorer = DeterministicScorer::new();
        for minutes in [1, 5, 30, 120, 600] {
            let task = Task::new("t", "Any", minutes).with_priority(Priority::High);
            let s = scorer.score(&task, &gap(at(8, 0), at(17, 0))).score;
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[tokio::test]
    async fn score_all_preserves_candidate_order() {
        let scorer = DeterministicScorer::new();
        let tasks = vec![Task::new("a", "A", 10), Task::new("b", "B", 20)];
        let slots = vec![gap(at(8, 0), at(9, 0))];
        let candidates = super::super::feasible_candidates(&tasks, &slots);

        let scores = scorer.score_all(Uuid::new_v4(), &candidates).await;
        let ids: Vec<_> = scores.iter().map(|s| s.task_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn score_all_matches_pairwise_scores() {
        let scorer = DeterministicScorer::new();
        let tasks = vec![
            Task::new("a", "A", 10).with_priority(Priority::High),
            Task::new("b", "B", 20).with_priority(Priority::Low),
            Task::new("c", "C", 45).with_preferred_window(t(13, 0), t(14, 0)),
        ];
        let slots = vec![
            CandidateSlot::from_gap(0, &Gap { start: at(8, 0), end: at(9, 0) }),
            CandidateSlot::from_gap(1, &Gap { start: at(12, 0), end: at(12, 30) }),
            CandidateSlot::from_gap(2, &Gap { start: at(13, 0), end: at(15, 0) }),
        ];
        let candidates = super::super::feasible_candidates(&tasks, &slots);

        let scores = scorer.score_all(Uuid::new_v4(), &candidates).await;
        assert_eq!(scores.len(), candidates.len());
        for (candidate, score) in candidates.iter().zip(&scores) {
            let expected = scorer.score(candidate.task, candidate.slot);
            assert_eq!(score.task_id, expected.task_id);
            assert_eq!(score.slot_id, expected.slot_id);
            assert_eq!(score.score, expected.score);
        }
    }
}
