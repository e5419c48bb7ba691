//! Free-time detection on the day's calendar.
//!
//! This module provides:
//! - Busy-interval merging and gap detection between calendar events
//! - Event-anchor slots for "right after X" placements
//! - Task placement inside a candidate slot

mod gap;
mod slot;

pub use gap::{CalendarGapFinder, Gap};
pub use slot::{CandidateSlot, Placement, SlotKind};
