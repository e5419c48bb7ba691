//! # Dayanchor Core Library
//!
//! This library anchors generated wellness tasks onto a person's existing
//! calendar. Each task either lands in a concrete free slot with a confidence
//! score and rationale, or stays standalone with its own default timing.
//! The `dayanchor` CLI is a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Timeline**: Free-gap and event-anchor detection for one working day
//! - **Scoring**: Deterministic, model-assisted and hybrid (task, slot) scoring
//! - **Assignment**: Threshold-gated greedy one-to-one matching
//! - **Holistic**: Single-call whole-day proposals, re-validated against the calendar
//! - **Provider**: Async seam to an external language model with bounded concurrency
//! - **Config**: TOML-based run defaults
//!
//! ## Key Components
//!
//! - [`AnchoringCoordinator`]: Runs the pipeline and never fails on provider problems
//! - [`CalendarGapFinder`]: Candidate slot computation
//! - [`ScoringStrategy`]: Common contract of the scoring strategies
//! - [`GreedyAssignmentService`]: Task-to-slot matching
//! - [`ScoringProvider`]: Trait for external scoring models

pub mod assignment;
pub mod calendar;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod holistic;
pub mod provider;
pub mod scoring;
pub mod task;
pub mod timeline;

pub use assignment::{Assignment, AssignmentOutcome, GreedyAssignmentService};
pub use calendar::{CalendarEvent, WorkingWindow};
pub use config::AnchorConfig;
pub use coordinator::{
    AnchoredTask, AnchoringCoordinator, AnchoringMode, AnchoringPhase, AnchoringRequest,
    AnchoringResult, AnchoringRun, SlotReference, StandaloneTask, UserPreferences,
};
pub use error::{
    ConfigError, ConfigurationError, CoreError, PhaseTransitionError, ProposalRejection,
    ProviderError,
};
pub use holistic::{HolisticError, HolisticModeAdapter};
pub use provider::{
    CompletionRequest, HttpScoringProvider, ProviderPool, RequestPurpose, ScoringProvider,
};
pub use scoring::{
    DeterministicScorer, HybridScorer, MatchScore, ModelAssistedScorer, ScoreFactor, ScoreSource,
    ScoringStrategy,
};
pub use task::{Priority, Task, TimeWindow};
pub use timeline::{CalendarGapFinder, CandidateSlot, Gap, Placement, SlotKind};
