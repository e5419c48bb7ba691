//! Task input types.
//!
//! Tasks arrive fully generated from upstream; anchoring never mutates them.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Task priority.
///
/// Ordered so that `High > Medium > Low`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    /// Multiplier applied to deterministic match scores.
    pub fn weight(&self) -> f64 {
        match self {
            Priority::High => 1.0,
            Priority::Medium => 0.7,
            Priority::Low => 0.4,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

/// Time-of-day window a task would ideally run in.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Whether `time` falls inside the window (inclusive bounds).
    pub fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start && time <= self.end
    }

    /// Minutes between `time` and the nearest window edge, 0 when inside.
    pub fn distance_minutes(&self, time: NaiveTime) -> i64 {
        if self.contains(time) {
            0
        } else if time < self.start {
            (self.start - time).num_minutes()
        } else {
            (time - self.end).num_minutes()
        }
    }
}

/// A generated wellness task waiting to be placed on the day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Free-form category from the generator (e.g. "movement", "mindfulness")
    #[serde(default)]
    pub category: String,
    /// Duration in minutes
    pub duration_minutes: i64,
    #[serde(default)]
    pub priority: Priority,
    /// Preferred time-of-day window
    #[serde(default)]
    pub preferred_window: Option<TimeWindow>,
    /// Start time used when the task ends up standalone
    #[serde(default)]
    pub default_start_time: Option<NaiveTime>,
}

impl Task {
    /// Create a task with medium priority and no timing preferences.
    pub fn new(id: impl Into<String>, title: impl Into<String>, duration_minutes: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            category: String::new(),
            duration_minutes,
            priority: Priority::Medium,
            preferred_window: None,
            default_start_time: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_preferred_window(mut self, start: NaiveTime, end: NaiveTime) -> Self {
        self.preferred_window = Some(TimeWindow::new(start, end));
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default_start(mut self, start: NaiveTime) -> Self {
        self.default_start_time = Some(start);
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes)
    }

    /// Self-timed start for a standalone task on `day`.
    ///
    /// Preferred-window start wins, then the task's own default, then `fallback`.
    pub fn standalone_start(&self, day: NaiveDate, fallback: NaiveTime) -> NaiveDateTime {
        let time = self
            .preferred_window
            .map(|w| w.start)
            .or(self.default_start_time)
            .unwrap_or(fallback);
        day.and_time(time)
    }
}
