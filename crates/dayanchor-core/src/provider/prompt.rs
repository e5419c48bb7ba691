//! Prompt construction for pair scoring and whole-day planning.

use serde_json::json;
use uuid::Uuid;

use super::{CompletionRequest, RequestPurpose};
use crate::calendar::CalendarEvent;
use crate::coordinator::UserPreferences;
use crate::task::Task;
use crate::timeline::{CandidateSlot, Placement, SlotKind};

const PAIR_SYSTEM: &str = "You rate how well a wellness task fits a specific slot in a \
person's day. Answer with a single JSON object: \
{\"confidence\": <number between 0 and 1>, \"rationale\": \"<one sentence>\"}.";

const DAY_PLAN_SYSTEM: &str = "You place wellness tasks onto a person's calendar for one day. \
Only use the free slots you are given. Answer with a single JSON object: \
{\"assignments\": [{\"task_id\": \"<id>\", \"anchored_time\": \"<YYYY-MM-DDTHH:MM:SS or null>\", \
\"confidence\": <number between 0 and 1>, \"rationale\": \"<one sentence>\"}]}. \
Every task must appear exactly once. Use null when a task should stay self-timed.";

fn slot_json(slot: &CandidateSlot) -> serde_json::Value {
    let (kind, after_event) = match &slot.kind {
        SlotKind::Gap => ("free_gap", None),
        SlotKind::EventAnchor { event_title, .. } => ("right_after_event", Some(event_title.as_str())),
    };
    json!({
        "slot_id": &slot.id,
        "kind": kind,
        "after_event": after_event,
        "start": slot.start,
        "end": slot.end,
        "minutes": slot.duration_minutes(),
    })
}

fn task_json(task: &Task) -> serde_json::Value {
    json!({
        "task_id": &task.id,
        "title": &task.title,
        "description": &task.description,
        "category": &task.category,
        "duration_minutes": task.duration_minutes,
        "priority": task.priority,
        "preferred_window": task.preferred_window,
    })
}

/// Request scoring a single (task, slot) pair at its computed placement.
pub fn pair_score_request(
    run_id: Uuid,
    task: &Task,
    slot: &CandidateSlot,
    placement: &Placement,
) -> CompletionRequest {
    let payload = json!({
        "task": task_json(task),
        "slot": slot_json(slot),
        "proposed_start": placement.start,
        "proposed_end": placement.end,
    });

    CompletionRequest {
        purpose: RequestPurpose::PairScore,
        run_id,
        system: PAIR_SYSTEM.to_string(),
        prompt: format!(
            "Rate this placement.\n\n```json\n{}\n```",
            serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
        ),
    }
}

/// Request a complete day assignment in one call.
pub fn day_plan_request(
    run_id: Uuid,
    tasks: &[Task],
    slots: &[CandidateSlot],
    events: &[CalendarEvent],
    preferences: Option<&UserPreferences>,
    confidence_threshold: f64,
) -> CompletionRequest {
    let payload = json!({
        "tasks": tasks.iter().map(task_json).collect::<Vec<_>>(),
        "free_slots": slots
            .iter()
            .filter(|s| s.duration_minutes() > 0)
            .map(slot_json)
            .collect::<Vec<_>>(),
        "calendar_events": events
            .iter()
            .map(|e| json!({ "id": &e.id, "title": &e.title, "start": e.start, "end": e.end }))
            .collect::<Vec<_>>(),
        "preferences": preferences,
        "minimum_confidence": confidence_threshold,
    });

    CompletionRequest {
        purpose: RequestPurpose::DayPlan,
        run_id,
        system: DAY_PLAN_SYSTEM.to_string(),
        prompt: format!(
            "Plan the day. Tasks must not overlap each other or any calendar event.\n\n```json\n{}\n```",
            serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
        ),
    }
}
