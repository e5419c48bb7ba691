//! Time gap detection between calendar events.
//!
//! Finds free intervals between busy periods inside the working window, and
//! emits one event-anchor slot per event for "right after X" placements.

use std::collections::HashSet;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::slot::CandidateSlot;
use crate::calendar::{CalendarEvent, WorkingWindow};

/// A detected free interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Gap {
    /// Create a gap, or `None` for an empty or inverted range.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Option<Self> {
        (end > start).then_some(Self { start, end })
    }

    /// Get duration in minutes
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Merged busy period, clamped to the window.
#[derive(Debug, Clone, Copy)]
struct Busy {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

/// Detector for free time and event anchors on one day.
#[derive(Debug, Clone)]
pub struct CalendarGapFinder {
    /// Breathing room kept next to real events (minutes)
    buffer_minutes: i64,
    /// Gaps shorter than this are dropped (minutes)
    min_gap_minutes: i64,
}

impl CalendarGapFinder {
    /// Create a finder with default settings (15 min buffer, 5 min minimum)
    pub fn new() -> Self {
        Self {
            buffer_minutes: 15,
            min_gap_minutes: 5,
        }
    }

    pub fn with_buffer(mut self, minutes: i64) -> Self {
        self.buffer_minutes = minutes.max(0);
        self
    }

    pub fn with_min_gap(mut self, minutes: i64) -> Self {
        self.min_gap_minutes = minutes.max(0);
        self
    }

    /// Find free gaps in the window, sorted by start time.
    ///
    /// The buffer is applied only against real events, so an empty calendar
    /// yields a single gap covering the whole window.
    pub fn find_gaps(&self, events: &[CalendarEvent], window: &WorkingWindow) -> Vec<Gap> {
        let busy = self.merge_busy(events, window);
        self.gaps_between(&busy, window)
    }

    fn gaps_between(&self, busy: &[Busy], window: &WorkingWindow) -> Vec<Gap> {
        let buffer = Duration::minutes(self.buffer_minutes);
        let mut gaps = Vec::new();
        let mut cursor = window.start;
        let mut after_event = false;

        for period in busy {
            let start = if after_event { cursor + buffer } else { cursor };
            self.push_viable(&mut gaps, start, period.start - buffer);
            cursor = period.end;
            after_event = true;
        }

        let start = if after_event { cursor + buffer } else { cursor };
        self.push_viable(&mut gaps, start, window.end);

        gaps
    }

    /// Compute every candidate slot (gaps and event anchors).
    ///
    /// Slots are ordered by start time; on equal starts gaps come before
    /// anchors, then by id.
    pub fn find_slots(&self, events: &[CalendarEvent], window: &WorkingWindow) -> Vec<CandidateSlot> {
        for event in events.iter().filter(|e| e.end <= e.start) {
            warn!(event_id = %event.id, "ignoring calendar event with non-positive duration");
        }

        let busy = self.merge_busy(events, window);
        let mut slots: Vec<CandidateSlot> = self
            .gaps_between(&busy, window)
            .iter()
            .enumerate()
            .map(|(i, gap)| CandidateSlot::from_gap(i, gap))
            .collect();

        slots.extend(self.event_anchors(events, window, &busy));
        slots.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| b.is_gap().cmp(&a.is_gap()))
                .then_with(|| a.id.cmp(&b.id))
        });

        debug!(
            gaps = slots.iter().filter(|s| s.is_gap()).count(),
            anchors = slots.iter().filter(|s| !s.is_gap()).count(),
            "computed candidate slots"
        );
        slots
    }

    /// One anchor per event overlapping the window.
    ///
    /// The anchor starts at the event's end and runs to the next busy period
    /// or the window end. If another event is still running at that moment
    /// the anchor has zero length.
    fn event_anchors(
        &self,
        events: &[CalendarEvent],
        window: &WorkingWindow,
        busy: &[Busy],
    ) -> Vec<CandidateSlot> {
        let mut seen = HashSet::new();
        let mut anchors = Vec::new();

        for event in Self::usable_events(events, window) {
            if !seen.insert(event.id.as_str()) {
                warn!(event_id = %event.id, "duplicate calendar event id, skipping anchor");
                continue;
            }

            let start = event.end.clamp(window.start, window.end);
            let still_busy = busy.iter().any(|b| b.start < start && start < b.end);
            let end = if still_busy {
                start
            } else {
                busy.iter()
                    .map(|b| b.start)
                    .filter(|s| *s >= start)
                    .min()
                    .unwrap_or(window.end)
            };

            anchors.push(CandidateSlot::event_anchor(&event.id, &event.title, start, end));
        }

        anchors
    }

    /// Clamp, sort and merge overlapping or touching events.
    fn merge_busy(&self, events: &[CalendarEvent], window: &WorkingWindow) -> Vec<Busy> {
        let mut clamped: Vec<Busy> = Self::usable_events(events, window)
            .map(|e| Busy {
                start: e.start.max(window.start),
                end: e.end.min(window.end),
            })
            .collect();
        clamped.sort_by_key(|b| (b.start, b.end));

        let mut merged: Vec<Busy> = Vec::with_capacity(clamped.len());
        for period in clamped {
            match merged.last_mut() {
                Some(last) if period.start <= last.end => {
                    last.end = last.end.max(period.end);
                }
                _ => merged.push(period),
            }
        }
        merged
    }

    fn usable_events<'a>(
        events: &'a [CalendarEvent],
        window: &'a WorkingWindow,
    ) -> impl Iterator<Item = &'a CalendarEvent> + 'a {
        let mut sorted: Vec<&CalendarEvent> = events
            .iter()
            .filter(|e| e.end > e.start && e.overlaps(window.start, window.end))
            .collect();
        sorted.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        sorted.into_iter()
    }

    fn push_viable(&self, gaps: &mut Vec<Gap>, start: NaiveDateTime, end: NaiveDateTime) {
        if let Some(gap) = Gap::new(start, end) {
            if gap.duration_minutes() >= self.min_gap_minutes {
                gaps.push(gap);
            }
        }
    }
}

impl Default for CalendarGapFinder {
    fn default() -> Self {
        Self::new()
    }
}
