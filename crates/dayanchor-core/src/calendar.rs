//! Calendar input types: busy events and the day's working window.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Existing calendar event treated as busy time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl CalendarEvent {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            start,
            end,
        }
    }

    /// Check if this event overlaps with a time range
    pub fn overlaps(&self, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.start < end && self.end > start
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Bounds of the day that may receive tasks.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkingWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl WorkingWindow {
    /// Build a window, rejecting empty or inverted ranges.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, ConfigurationError> {
        let window = Self { start, end };
        window.validate()?;
        Ok(window)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.end <= self.start {
            return Err(ConfigurationError::InvalidWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// The run's calendar day.
    pub fn day(&self) -> NaiveDate {
        self.start.date()
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn window_rejects_inverted_range() {
        assert!(WorkingWindow::new(at(8, 0), at(17, 0)).is_ok());
        assert_eq!(
            WorkingWindow::new(at(17, 0), at(8, 0)),
            Err(ConfigurationError::InvalidWindow {
                start: at(17, 0),
                end: at(8, 0)
            })
        );
        assert!(WorkingWindow::new(at(8, 0), at(8, 0)).is_err());
    }

    #[test]
    fn event_overlap() {
        let event = CalendarEvent::new("e1", "Standup", at(9, 0), at(9, 30));
        assert!(event.overlaps(at(9, 15), at(10, 0)));
        assert!(!event.overlaps(at(9, 30), at(10, 0)));
        assert_eq!(event.duration_minutes(), 30);
    }
}
