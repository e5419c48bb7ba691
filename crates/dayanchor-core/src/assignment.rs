//! Greedy one-to-one assignment of tasks to slots.
//!
//! Pairs are visited best score first. A pair is committed only when its
//! score clears the confidence threshold, neither the task nor the slot has
//! been used yet, and the task's placement does not overlap anything already
//! committed. Event anchors and gaps can share wall-clock time, so the
//! overlap check is what keeps two tasks from landing on the same minutes.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scoring::{MatchScore, ScoreSource};
use crate::task::Task;
use crate::timeline::{CandidateSlot, Placement};

/// A task committed to a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: String,
    pub slot_id: String,
    /// Match score in [0, 1], always at or above the run's threshold
    pub confidence: f64,
    pub anchored_time: NaiveDateTime,
    pub anchored_end: NaiveDateTime,
    pub rationale: String,
    pub source: ScoreSource,
}

impl Assignment {
    pub fn placement(&self) -> Placement {
        Placement {
            start: self.anchored_time,
            end: self.anchored_end,
        }
    }
}

/// Result of an assignment pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssignmentOutcome {
    pub assignments: Vec<Assignment>,
    /// Task ids left without a slot, in input order
    pub unassigned: Vec<String>,
}

impl AssignmentOutcome {
    /// Every task standalone.
    pub fn all_unassigned(tasks: &[Task]) -> Self {
        Self {
            assignments: Vec::new(),
            unassigned: tasks.iter().map(|t| t.id.clone()).collect(),
        }
    }
}

/// Threshold-gated greedy matcher.
#[derive(Debug, Clone, Copy)]
pub struct GreedyAssignmentService {
    threshold: f64,
}

impl GreedyAssignmentService {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Assign tasks to slots using `scores`.
    ///
    /// Scores referring to unknown tasks or slots are ignored. Ties are broken
    /// by task priority (higher first), then task id, then slot id, so the
    /// outcome is fully determined by the inputs.
    pub fn assign(
        &self,
        tasks: &[Task],
        slots: &[CandidateSlot],
        scores: &[MatchScore],
    ) -> AssignmentOutcome {
        let task_index: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();
        let slot_index: HashMap<&str, &CandidateSlot> =
            slots.iter().map(|s| (s.id.as_str(), s)).collect();

        let mut ranked: Vec<(&MatchScore, &Task, &CandidateSlot)> = scores
            .iter()
            .filter_map(|score| {
                let task = task_index.get(score.task_id.as_str())?;
                let slot = slot_index.get(score.slot_id.as_str())?;
                Some((score, *task, *slot))
            })
            .collect();

        ranked.sort_by(|(a, a_task, _), (b, b_task, _)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b_task.priority.cmp(&a_task.priority))
                .then_with(|| a.task_id.cmp(&b.task_id))
                .then_with(|| a.slot_id.cmp(&b.slot_id))
        });

        let mut used_tasks: HashSet<&str> = HashSet::new();
        let mut used_slots: HashSet<&str> = HashSet::new();
        let mut committed: Vec<Placement> = Vec::new();
        let mut assignments = Vec::new();

        for (score, task, slot) in ranked {
            // NaN sorts first under total_cmp
            if score.score.is_nan() || score.score < self.threshold {
                continue;
            }
            if used_tasks.contains(task.id.as_str()) || used_slots.contains(slot.id.as_str()) {
                continue;
            }
            let Some(placement) = slot.placement_for(task) else {
                continue;
            };
            if committed.iter().any(|p| p.overlaps(&placement)) {
                debug!(
                    task_id = %task.id,
                    slot_id = %slot.id,
                    "skipping pair that overlaps an earlier assignment"
                );
                continue;
            }

            used_tasks.insert(task.id.as_str());
            used_slots.insert(slot.id.as_str());
            committed.push(placement);
            assignments.push(Assignment {
                task_id: task.id.clone(),
                slot_id: slot.id.clone(),
                confidence: score.score,
                anchored_time: placement.start,
                anchored_end: placement.end,
                rationale: score.rationale.clone(),
                source: score.source,
            });
        }

        let unassigned = tasks
            .iter()
            .filter(|t| !used_tasks.contains(t.id.as_str()))
            .map(|t| t.id.clone())
            .collect();

        AssignmentOutcome {
            assignments,
            unassigned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoreFactor;
    use crate::task::Priority;
    use crate::timeline::Gap;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn gap(index: usize, start: NaiveDateTime, end: NaiveDateTime) -> CandidateSlot {
        CandidateSlot::from_gap(index, &Gap { start, end })
    }

    fn score(task: &str, slot: &str, value: f64) -> MatchScore {
        MatchScore {
            task_id: task.to_string(),
            slot_id: slot.to_string(),
            score: value,
            rationale: format!("{task} in {slot}"),
            factors: vec![ScoreFactor::new("fixed", 1.0, value)],
            source: ScoreSource::Deterministic,
        }
    }

    #[test]
    fn best_pair_wins_the_slot() {
        let tasks = vec![Task::new("a", "A", 10), Task::new("b", "B", 10)];
        let slots = vec![gap(0, at(8, 0), at(8, 30))];
        let scores = vec![score("a", "gap-0", 0.8), score("b", "gap-0", 0.9)];

        let outcome = GreedyAssignmentService::new(0.5).assign(&tasks, &slots, &scores);
        assert_eq!(outcome.assignments.len(), 1);
        assert_eq!(outcome.assignments[0].task_id, "b");
        assert_eq!(outcome.unassigned, vec!["a".to_string()]);
    }

    #[test]
    fn below_threshold_stays_unassigned() {
        let tasks = vec![Task::new("a", "A", 10)];
        let slots = vec![gap(0, at(8, 0), at(8, 30))];
        let scores = vec![score("a", "gap-0", 0.69)];

        let outcome = GreedyAssignmentService::new(0.7).assign(&tasks, &slots, &scores);
        assert!(outcome.assignments.is_empty());
        assert_eq!(outcome.unassigned, vec!["a".to_string()]);
    }

    #[test]
    fn threshold_is_inclusive() {
        let tasks = vec![Task::new("a", "A", 10)];
        let slots = vec![gap(0, at(8, 0), at(8, 30))];
        let scores = vec![score("a", "gap-0", 0.7)];

        let outcome = GreedyAssignmentService::new(0.7).assign(&tasks, &slots, &scores);
        assert_eq!(outcome.assignments.len(), 1);
    }

    #[test]
    fn ties_prefer_higher_priority_then_id() {
        let tasks = vec![
            Task::new("z", "Z", 10).with_priority(Priority::Low),
            Task::new("y", "Y", 10).with_priority(Priority::High),
            Task::new("x", "X", 10).with_priority(Priority::High),
        ];
        let slots = vec![gap(0, at(8, 0), at(8, 30))];
        let scores = vec![
            score("z", "gap-0", 0.8),
            score("y", "gap-0", 0.8),
            score("x", "gap-0", 0.8),
        ];

        let outcome = GreedyAssignmentService::new(0.5).assign(&tasks, &slots, &scores);
        assert_eq!(outcome.assignments[0].task_id, "x");
        assert_eq!(outcome.unassigned, vec!["z".to_string(), "y".to_string()]);
    }

    #[test]
    fn overlapping_slots_do_not_double_book() {
        let tasks = vec![Task::new("a", "A", 10), Task::new("b", "B", 10)];
        let anchor = CandidateSlot::event_anchor("e1", "Standup", at(9, 0), at(10, 0));
        let slots = vec![anchor, gap(0, at(9, 0), at(10, 0))];
        let scores = vec![score("a", "anchor-e1", 0.9), score("b", "gap-0", 0.85)];

        let outcome = GreedyAssignmentService::new(0.5).assign(&tasks, &slots, &scores);
        assert_eq!(outcome.assignments.len(), 1);
        assert_eq!(outcome.assignments[0].task_id, "a");
        assert_eq!(outcome.unassigned, vec!["b".to_string()]);
    }

    #[test]
    fn infeasible_and_unknown_scores_are_ignored() {
        let tasks = vec![Task::new("long", "Run", 60)];
        let slots = vec![gap(0, at(8, 0), at(8, 30))];
        let scores = vec![score("long", "gap-0", 0.99), score("ghost", "gap-0", 1.0)];

        let outcome = GreedyAssignmentService::new(0.1).assign(&tasks, &slots, &scores);
        assert!(outcome.assignments.is_empty());
        assert_eq!(outcome.unassigned, vec!["long".to_string()]);
    }

    #[test]
    fn nan_scores_never_commit() {
        let tasks = vec![Task::new("a", "A", 10)];
        let slots = vec![gap(0, at(8, 0), at(8, 30))];
        let scores = vec![score("a", "gap-0", f64::NAN)];

        let outcome = GreedyAssignmentService::new(0.0).assign(&tasks, &slots, &scores);
        assert!(outcome.assignments.is_empty());
    }

    fn arb_case() -> impl Strategy<Value = (Vec<i64>, Vec<(u32, u32)>, Vec<f64>, f64)> {
        (
            prop::collection::vec(5i64..90, 1..6),
            prop::collection::vec((0u32..16, 1u32..6), 1..6),
            prop::collection::vec(0.0f64..=1.0, 36),
            0.0f64..=1.0,
        )
    }

    proptest! {
        #[test]
        fn greedy_invariants_hold((durations, raw_slots, values, threshold) in arb_case()) {
            let tasks: Vec<Task> = durations
                .iter()
                .enumerate()
                .map(|(i, d)| Task::new(format!("t{i}"), "Task", *d))
                .collect();
            // Quarter-hour slots that may overlap each other
            let slots: Vec<CandidateSlot> = raw_slots
                .iter()
                .enumerate()
                .map(|(i, (offset, len))| {
                    let start = at(8, 0) + chrono::Duration::minutes(*offset as i64 * 15);
                    gap(i, start, start + chrono::Duration::minutes(*len as i64 * 15))
                })
                .collect();
            let mut scores = Vec::new();
            for (ti, task) in tasks.iter().enumerate() {
                for (si, slot) in slots.iter().enumerate() {
                    scores.push(score(&task.id, &slot.id, values[ti * 6 + si]));
                }
            }

            let outcome = GreedyAssignmentService::new(threshold).assign(&tasks, &slots, &scores);

            let mut seen_slots = HashSet::new();
            for a in &outcome.assignments {
                prop_assert!(a.confidence >= threshold);
                prop_assert!(seen_slots.insert(a.slot_id.clone()));
                let slot = slots.iter().find(|s| s.id == a.slot_id).unwrap();
                prop_assert!(slot.contains(a.anchored_time, a.anchored_end));
            }
            for (i, a) in outcome.assignments.iter().enumerate() {
                for b in &outcome.assignments[i + 1..] {
                    prop_assert!(!a.placement().overlaps(&b.placement()));
                }
            }

            let mut ids: Vec<String> = outcome
                .assignments
                .iter()
                .map(|a| a.task_id.clone())
                .chain(outcome.unassigned.iter().cloned())
                .collect();
            ids.sort();
            let mut expected: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
            expected.sort();
            prop_assert_eq!(ids, expected);
        }
    }
}
