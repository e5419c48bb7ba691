//! Candidate slots and task placement.

use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::gap::Gap;
use crate::task::Task;

/// Where a candidate slot comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlotKind {
    /// Free interval between busy periods
    Gap,
    /// Point right after an existing event
    EventAnchor {
        event_id: String,
        event_title: String,
    },
}

/// A place on the calendar that can receive one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSlot {
    pub id: String,
    pub kind: SlotKind,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl CandidateSlot {
    pub fn from_gap(index: usize, gap: &Gap) -> Self {
        Self {
            id: format!("gap-{index}"),
            kind: SlotKind::Gap,
            start: gap.start,
            end: gap.end,
        }
    }

    pub fn event_anchor(
        event_id: &str,
        event_title: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Self {
        Self {
            id: format!("anchor-{event_id}"),
            kind: SlotKind::EventAnchor {
                event_id: event_id.to_string(),
                event_title: event_title.to_string(),
            },
            start,
            end,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn is_gap(&self) -> bool {
        matches!(self.kind, SlotKind::Gap)
    }

    /// Event this slot follows, if it is an event anchor.
    pub fn anchor_event_id(&self) -> Option<&str> {
        match &self.kind {
            SlotKind::EventAnchor { event_id, .. } => Some(event_id),
            SlotKind::Gap => None,
        }
    }

    /// Check if a task of given duration fits entirely
    pub fn can_fit(&self, minutes: i64) -> bool {
        minutes > 0 && self.duration_minutes() >= minutes
    }

    /// Whether `[start, end]` lies within the slot bounds.
    pub fn contains(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        start >= self.start && end <= self.end && start <= end
    }

    /// Concrete start/end `task` would occupy in this slot.
    ///
    /// Event anchors always place the task right after the event. Gaps aim for
    /// the start of the task's preferred window, clamped so the task stays
    /// inside the gap. Returns `None` when the task does not fit.
    pub fn placement_for(&self, task: &Task) -> Option<Placement> {
        if !self.can_fit(task.duration_minutes) {
            return None;
        }

        let latest_start = self.end - task.duration();
        let start = match (&self.kind, task.preferred_window) {
            (SlotKind::Gap, Some(window)) => {
                let desired = self.start.date().and_time(window.start);
                desired.clamp(self.start, latest_start)
            }
            _ => self.start,
        };

        Some(Placement {
            start,
            end: start + task.duration(),
        })
    }
}

/// Concrete time a task would occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Placement {
    pub fn overlaps(&self, other: &Placement) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn start_time(&self) -> NaiveTime {
        self.start.time()
    }
}
