//! Single-call whole-day planning with independent re-validation.
//!
//! The model proposes a time (or none) for every task. Nothing it says about
//! availability is trusted: every proposed placement is checked against the
//! candidate slots computed from the calendar, and any problem rejects the
//! whole proposal so the caller can fall back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::assignment::{Assignment, AssignmentOutcome};
use crate::calendar::CalendarEvent;
use crate::coordinator::UserPreferences;
use crate::error::{ProposalRejection, ProviderError};
use crate::provider::{extract_json, prompt, ProviderPool};
use crate::scoring::ScoreSource;
use crate::task::Task;
use crate::timeline::{CandidateSlot, Placement};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Why a holistic proposal could not be used.
#[derive(Error, Debug)]
pub enum HolisticError {
    #[error("day planner call failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("day plan rejected: {0}")]
    Rejected(#[from] ProposalRejection),
}

/// One entry of the model's day plan.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProposedAssignment {
    pub task_id: String,
    #[serde(default)]
    pub anchored_time: Option<String>,
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Deserialize)]
struct DayProposal {
    assignments: Vec<ProposedAssignment>,
}

/// Everything the day planner sees for one run.
#[derive(Debug, Clone, Copy)]
pub struct DayContext<'a> {
    pub day: NaiveDate,
    pub tasks: &'a [Task],
    pub slots: &'a [CandidateSlot],
    pub events: &'a [CalendarEvent],
    pub preferences: Option<&'a UserPreferences>,
    pub confidence_threshold: f64,
}

/// Asks the scoring provider for a complete day in one call.
pub struct HolisticModeAdapter {
    pool: Arc<ProviderPool>,
    timeout: Duration,
}

impl HolisticModeAdapter {
    pub fn new(pool: Arc<ProviderPool>, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// Request, parse and validate a day plan.
    pub async fn propose(
        &self,
        run_id: Uuid,
        context: DayContext<'_>,
    ) -> Result<AssignmentOutcome, HolisticError> {
        let request = prompt::day_plan_request(
            run_id,
            context.tasks,
            context.slots,
            context.events,
            context.preferences,
            context.confidence_threshold,
        );
        let raw = self.pool.call(&request, self.timeout).await?;
        let proposal = parse_proposal(&raw)?;

        debug!(
            run_id = %run_id,
            entries = proposal.len(),
            "validating day plan"
        );

        Ok(validate_proposal(&proposal, &context)?)
    }
}

/// Parse the model's raw answer into proposal entries.
pub fn parse_proposal(raw: &str) -> Result<Vec<ProposedAssignment>, ProposalRejection> {
    let json = extract_json(raw)
        .ok_or_else(|| ProposalRejection::Malformed("no JSON object in response".to_string()))?;
    let proposal: DayProposal =
        serde_json::from_str(&json).map_err(|e| ProposalRejection::Malformed(e.to_string()))?;
    Ok(proposal.assignments)
}

/// Parse a proposed time on `day`.
///
/// Accepts full local date-times in a few common layouts, or a bare `HH:MM`
/// taken on the run's day.
pub fn parse_anchored_time(value: &str, day: NaiveDate) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveTime::parse_from_str(value, "%H:%M")
                .ok()
                .map(|time| day.and_time(time))
        })
}

struct Accepted<'a> {
    task: &'a Task,
    entry: &'a ProposedAssignment,
    placement: Placement,
}

/// Check a proposal against the tasks and independently computed slots.
///
/// Entries without a time, or below the confidence threshold, leave their
/// task standalone. Every other entry must occupy a free slot of its own and
/// must not overlap another accepted entry.
pub fn validate_proposal(
    proposal: &[ProposedAssignment],
    context: &DayContext<'_>,
) -> Result<AssignmentOutcome, ProposalRejection> {
    let tasks: HashMap<&str, &Task> = context.tasks.iter().map(|t| (t.id.as_str(), t)).collect();

    let mut seen: HashSet<&str> = HashSet::new();
    for entry in proposal {
        if !tasks.contains_key(entry.task_id.as_str()) {
            return Err(ProposalRejection::UnknownTask(entry.task_id.clone()));
        }
        if !seen.insert(entry.task_id.as_str()) {
            return Err(ProposalRejection::DuplicateTask(entry.task_id.clone()));
        }
        if !(0.0..=1.0).contains(&entry.confidence) {
            return Err(ProposalRejection::InvalidConfidence {
                task_id: entry.task_id.clone(),
                confidence: entry.confidence,
            });
        }
    }
    if let Some(missing) = context.tasks.iter().find(|t| !seen.contains(t.id.as_str())) {
        return Err(ProposalRejection::MissingTask(missing.id.clone()));
    }

    let mut accepted = Vec::new();
    for entry in proposal {
        let Some(value) = entry.anchored_time.as_deref() else {
            continue;
        };
        let start = parse_anchored_time(value, context.day).ok_or_else(|| {
            ProposalRejection::UnparseableTime {
                task_id: entry.task_id.clone(),
                value: value.to_string(),
            }
        })?;
        if entry.confidence < context.confidence_threshold {
            continue;
        }
        let task = tasks[entry.task_id.as_str()];
        let end = start.checked_add_signed(task.duration()).ok_or_else(|| {
            ProposalRejection::OutsideSlots {
                task_id: entry.task_id.clone(),
                time: start,
            }
        })?;
        accepted.push(Accepted {
            task,
            entry,
            placement: Placement { start, end },
        });
    }

    accepted.sort_by(|a, b| {
        a.placement
            .start
            .cmp(&b.placement.start)
            .then_with(|| a.task.id.cmp(&b.task.id))
    });
    for pair in accepted.windows(2) {
        if pair[0].placement.overlaps(&pair[1].placement) {
            return Err(ProposalRejection::Collision {
                first: pair[0].task.id.clone(),
                second: pair[1].task.id.clone(),
            });
        }
    }

    let mut claimed: HashSet<&str> = HashSet::new();
    let mut by_task: HashMap<&str, Assignment> = HashMap::new();
    for item in &accepted {
        let slot = claim_slot(item, context.slots, &claimed)?;
        claimed.insert(slot.id.as_str());
        by_task.insert(
            item.task.id.as_str(),
            Assignment {
                task_id: item.task.id.clone(),
                slot_id: slot.id.clone(),
                confidence: item.entry.confidence,
                anchored_time: item.placement.start,
                anchored_end: item.placement.end,
                rationale: item.entry.rationale.clone(),
                source: ScoreSource::Model,
            },
        );
    }

    let mut outcome = AssignmentOutcome::default();
    for task in context.tasks {
        match by_task.remove(task.id.as_str()) {
            Some(assignment) => outcome.assignments.push(assignment),
            None => outcome.unassigned.push(task.id.clone()),
        }
    }
    Ok(outcome)
}

/// Pick the slot a proposed placement occupies.
///
/// An event anchor starting exactly at the proposed time wins, then gaps in
/// chronological order, then any other anchor.
fn claim_slot<'s>(
    item: &Accepted<'_>,
    slots: &'s [CandidateSlot],
    claimed: &HashSet<&str>,
) -> Result<&'s CandidateSlot, ProposalRejection> {
    let mut containing: Vec<&CandidateSlot> = slots
        .iter()
        .filter(|s| s.contains(item.placement.start, item.placement.end))
        .collect();
    if containing.is_empty() {
        return Err(ProposalRejection::OutsideSlots {
            task_id: item.task.id.clone(),
            time: item.placement.start,
        });
    }

    containing.sort_by_key(|s| {
        let rank = match (s.is_gap(), s.start == item.placement.start) {
            (false, true) => 0,
            (true, _) => 1,
            (false, false) => 2,
        };
        (rank, s.start, s.id.clone())
    });

    let first = containing[0];
    containing
        .into_iter()
        .find(|s| !claimed.contains(s.id.as_str()))
        .ok_or_else(|| ProposalRejection::SlotConflict {
            task_id: item.task.id.clone(),
            slot_id: first.id.clone(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::WorkingWindow;
    use crate::provider::{CompletionRequest, ScoringProvider};
    use crate::timeline::CalendarGapFinder;
    use async_trait::async_trait;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, 0).unwrap()
    }

    struct Fixture {
        tasks: Vec<Task>,
        slots: Vec<CandidateSlot>,
        events: Vec<CalendarEvent>,
    }

    impl Fixture {
        // gap-0 08:00-08:45, anchor-e1 09:30-17:00, gap-1 09:45-17:00
        fn new() -> Self {
            let events = vec![CalendarEvent::new("e1", "Standup", at(9, 0), at(9, 30))];
            let window = WorkingWindow::new(at(8, 0), at(17, 0)).unwrap();
            let slots = CalendarGapFinder::new().find_slots(&events, &window);
            let tasks = vec![
                Task::new("t1", "Breathe", 15),
                Task::new("t2", "Walk", 30),
            ];
            Self {
                tasks,
                slots,
                events,
            }
        }

        fn context(&self) -> DayContext<'_> {
            DayContext {
                day: day(),
                tasks: &self.tasks,
                slots: &self.slots,
                events: &self.events,
                preferences: None,
                confidence_threshold: 0.7,
            }
        }
    }

    fn entry(task_id: &str, time: Option<&str>, confidence: f64) -> ProposedAssignment {
        ProposedAssignment {
            task_id: task_id.to_string(),
            anchored_time: time.map(str::to_string),
            confidence,
            rationale: format!("{task_id} fits"),
        }
    }

    #[test]
    fn accepts_valid_plan() {
        let fx = Fixture::new();
        let proposal = vec![
            entry("t1", Some("2026-10-19T08:00:00"), 0.9),
            entry("t2", Some("09:30"), 0.8),
        ];

        let outcome = validate_proposal(&proposal, &fx.context()).unwrap();
        assert!(outcome.unassigned.is_empty());
        assert_eq!(outcome.assignments[0].slot_id, "gap-0");
        assert_eq!(outcome.assignments[1].slot_id, "anchor-e1");
        assert_eq!(outcome.assignments[1].anchored_end, at(10, 0));
        assert_eq!(outcome.assignments[1].source, ScoreSource::Model);
    }

    #[test]
    fn rejects_duplicate_task() {
        let fx = Fixture::new();
        let proposal = vec![
            entry("t1", Some("08:00"), 0.9),
            entry("t1", Some("10:00"), 0.9),
            entry("t2", None, 0.5),
        ];
        assert_eq!(
            validate_proposal(&proposal, &fx.context()),
            Err(ProposalRejection::DuplicateTask("t1".to_string()))
        );
    }

    #[test]
    fn rejects_missing_and_unknown_tasks() {
        let fx = Fixture::new();
        let missing = vec![entry("t1", Some("08:00"), 0.9)];
        assert_eq!(
            validate_proposal(&missing, &fx.context()),
            Err(ProposalRejection::MissingTask("t2".to_string()))
        );

        let unknown = vec![
            entry("t1", None, 0.9),
            entry("t2", None, 0.9),
            entry("t9", None, 0.9),
        ];
        assert_eq!(
            validate_proposal(&unknown, &fx.context()),
            Err(ProposalRejection::UnknownTask("t9".to_string()))
        );
    }

    #[test]
    fn rejects_colliding_times() {
        let fx = Fixture::new();
        let proposal = vec![
            entry("t2", Some("10:00"), 0.9),
            entry("t1", Some("10:15"), 0.9),
        ];
        assert_eq!(
            validate_proposal(&proposal, &fx.context()),
            Err(ProposalRejection::Collision {
                first: "t2".to_string(),
                second: "t1".to_string(),
            })
        );
    }

    #[test]
    fn rejects_time_during_event() {
        let fx = Fixture::new();
        let proposal = vec![entry("t1", Some("09:05"), 0.9), entry("t2", None, 0.9)];
        assert_eq!(
            validate_proposal(&proposal, &fx.context()),
            Err(ProposalRejection::OutsideSlots {
                task_id: "t1".to_string(),
                time: at(9, 5),
            })
        );
    }

    #[test]
    fn rejects_second_task_in_same_slot() {
        let mut fx = Fixture::new();
        fx.tasks[1] = Task::new("t2", "Stretch", 10);
        // Both fit inside gap-0 without overlapping
        let proposal = vec![
            entry("t1", Some("08:00"), 0.9),
            entry("t2", Some("08:20"), 0.9),
        ];
        assert_eq!(
            validate_proposal(&proposal, &fx.context()),
            Err(ProposalRejection::SlotConflict {
                task_id: "t2".to_string(),
                slot_id: "gap-0".to_string(),
            })
        );
    }

    #[test]
    fn low_confidence_and_null_times_stay_standalone() {
        let fx = Fixture::new();
        // t2 would collide with t1 but is below the threshold
        let proposal = vec![
            entry("t1", Some("10:00"), 0.9),
            entry("t2", Some("10:00"), 0.4),
        ];
        let outcome = validate_proposal(&proposal, &fx.context()).unwrap();
        assert_eq!(outcome.assignments.len(), 1);
        assert_eq!(outcome.unassigned, vec!["t2".to_string()]);

        let proposal = vec![entry("t1", None, 0.9), entry("t2", None, 0.9)];
        let outcome = validate_proposal(&proposal, &fx.context()).unwrap();
        assert!(outcome.assignments.is_empty());
        assert_eq!(outcome.unassigned.len(), 2);
    }

    #[test]
    fn rejects_bad_confidence_and_times() {
        let fx = Fixture::new();
        let proposal = vec![entry("t1", None, 1.4), entry("t2", None, 0.9)];
        assert!(matches!(
            validate_proposal(&proposal, &fx.context()),
            Err(ProposalRejection::InvalidConfidence { .. })
        ));

        let proposal = vec![entry("t1", Some("after lunch"), 0.9), entry("t2", None, 0.9)];
        assert!(matches!(
            validate_proposal(&proposal, &fx.context()),
            Err(ProposalRejection::UnparseableTime { .. })
        ));
    }

    #[test]
    fn parses_supported_time_layouts() {
        assert_eq!(parse_anchored_time("2026-10-19T08:15:00", day()), Some(at(8, 15)));
        assert_eq!(parse_anchored_time("2026-10-19T08:15", day()), Some(at(8, 15)));
        assert_eq!(parse_anchored_time("2026-10-19 08:15:00", day()), Some(at(8, 15)));
        assert_eq!(parse_anchored_time(" 08:15 ", day()), Some(at(8, 15)));
        assert_eq!(parse_anchored_time("8am", day()), None);
    }

    #[test]
    fn parse_proposal_handles_fenced_json() {
        let raw = "Here is the plan:\n```json\n{\"assignments\": [{\"task_id\": \"t1\", \
                   \"anchored_time\": null, \"confidence\": 0.2, \"rationale\": \"busy day\"}]}\n```";
        let entries = parse_proposal(raw).unwrap();
        assert_eq!(entries, vec![ProposedAssignment {
            task_id: "t1".to_string(),
            anchored_time: None,
            confidence: 0.2,
            rationale: "busy day".to_string(),
        }]);

        assert!(matches!(
            parse_proposal("no plan today"),
            Err(ProposalRejection::Malformed(_))
        ));
    }

    struct FixedProvider(String);

    #[async_trait]
    impl ScoringProvider for FixedProvider {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<String, ProviderError> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn propose_round_trips_through_provider() {
        let fx = Fixture::new();
        let body = r#"{"assignments": [
            {"task_id": "t1", "anchored_time": "2026-10-19T08:00:00", "confidence": 0.9, "rationale": "early calm"},
            {"task_id": "t2", "anchored_time": null, "confidence": 0.0, "rationale": "no room"}
        ]}"#;
        let pool = Arc::new(ProviderPool::new(Arc::new(FixedProvider(body.to_string())), 1));
        let adapter = HolisticModeAdapter::new(pool, Duration::from_secs(1));

        let outcome = adapter.propose(Uuid::new_v4(), fx.context()).await.unwrap();
        assert_eq!(outcome.assignments.len(), 1);
        assert_eq!(outcome.assignments[0].rationale, "early calm");
        assert_eq!(outcome.unassigned, vec!["t2".to_string()]);
    }

    #[tokio::test]
    async fn propose_surfaces_rejections() {
        let fx = Fixture::new();
        let body = r#"{"assignments": [{"task_id": "t1", "anchored_time": null, "confidence": 0.9}]}"#;
        let pool = Arc::new(ProviderPool::new(Arc::new(FixedProvider(body.to_string())), 1));
        let adapter = HolisticModeAdapter::new(pool, Duration::from_secs(1));

        let err = adapter.propose(Uuid::new_v4(), fx.context()).await.unwrap_err();
        assert!(matches!(
            err,
            HolisticError::Rejected(ProposalRejection::MissingTask(_))
        ));
    }
}
