//! Anchoring run orchestration.
//!
//! A run moves through an explicit phase machine:
//!
//! ```text
//! Idle → SlotsComputed → Scored → Assigned → Finalized
//!   └──→ Failed   (configuration errors only)
//! ```
//!
//! Provider problems never fail a run. A missing provider degrades the mode
//! to deterministic, failed pair calls fall back per pair, and a rejected
//! holistic plan falls back to the hybrid path.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::assignment::{Assignment, AssignmentOutcome, GreedyAssignmentService};
use crate::calendar::{CalendarEvent, WorkingWindow};
use crate::config::AnchorConfig;
use crate::error::{ConfigurationError, CoreError, PhaseTransitionError};
use crate::holistic::{DayContext, HolisticModeAdapter};
use crate::provider::{ProviderPool, ScoringProvider};
use crate::scoring::{
    feasible_candidates, DeterministicScorer, HybridScorer, ModelAssistedScorer, ScoreSource,
    ScoringStrategy,
};
use crate::task::Task;
use crate::timeline::{CalendarGapFinder, CandidateSlot, SlotKind};

/// Longest task a run accepts: one day.
const MAX_TASK_MINUTES: i64 = 24 * 60;

/// How a run produces its assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchoringMode {
    /// Heuristic scoring only, no provider calls
    Deterministic,
    /// Heuristic scoring with the top candidates re-ranked by the provider
    #[default]
    Hybrid,
    /// One provider call proposes the whole day
    #[serde(rename = "ai_only", alias = "holistic", alias = "holistic_model_only")]
    HolisticModelOnly,
}

impl AnchoringMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnchoringMode::Deterministic => "deterministic",
            AnchoringMode::Hybrid => "hybrid",
            AnchoringMode::HolisticModelOnly => "ai_only",
        }
    }

    pub fn uses_provider(&self) -> bool {
        !matches!(self, AnchoringMode::Deterministic)
    }
}

impl fmt::Display for AnchoringMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnchoringMode {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "deterministic" => Ok(AnchoringMode::Deterministic),
            "hybrid" => Ok(AnchoringMode::Hybrid),
            "ai_only" | "ai-only" | "holistic" | "holistic_model_only" => {
                Ok(AnchoringMode::HolisticModelOnly)
            }
            other => Err(ConfigurationError::InvalidSetting {
                key: "mode".to_string(),
                message: format!("unknown mode '{other}' (expected deterministic, hybrid or ai_only)"),
            }),
        }
    }
}

/// Optional user context forwarded to the day planner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    /// Coarse user profile, e.g. "early_bird"
    #[serde(default)]
    pub archetype: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Inputs of one anchoring run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchoringRequest {
    #[serde(default)]
    pub working_window: Option<WorkingWindow>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub events: Vec<CalendarEvent>,
    /// Falls back to the configured default mode
    #[serde(default)]
    pub mode: Option<AnchoringMode>,
    /// Falls back to the configured threshold
    #[serde(default)]
    pub confidence_threshold: Option<f64>,
    #[serde(default)]
    pub preferences: Option<UserPreferences>,
}

impl AnchoringRequest {
    pub fn new(window: WorkingWindow, tasks: Vec<Task>) -> Self {
        Self {
            working_window: Some(window),
            tasks,
            events: Vec::new(),
            mode: None,
            confidence_threshold: None,
            preferences: None,
        }
    }

    /// Parse a request from its JSON form.
    pub fn from_json(content: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn with_events(mut self, events: Vec<CalendarEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn with_mode(mut self, mode: AnchoringMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.confidence_threshold = Some(threshold);
        self
    }

    pub fn with_preferences(mut self, preferences: UserPreferences) -> Self {
        self.preferences = Some(preferences);
        self
    }
}

/// The slot an anchored task was placed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotReference {
    pub slot_id: String,
    pub kind: SlotKind,
}

/// A task placed on the calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchoredTask {
    #[serde(flatten)]
    pub task: Task,
    pub anchored_time: NaiveDateTime,
    pub anchored_end: NaiveDateTime,
    pub anchored_to: SlotReference,
    pub confidence: f64,
    pub rationale: String,
    pub score_source: ScoreSource,
}

/// A task left on its own timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandaloneTask {
    #[serde(flatten)]
    pub task: Task,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
}

/// Output of an anchoring run.
///
/// Every input task appears in exactly one of the two lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchoringResult {
    pub run_id: Uuid,
    pub mode_used: AnchoringMode,
    /// Why the run did not use the requested mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub anchored_tasks: Vec<AnchoredTask>,
    pub standalone_tasks: Vec<StandaloneTask>,
    pub summary: String,
}

impl AnchoringResult {
    pub fn total_tasks(&self) -> usize {
        self.anchored_tasks.len() + self.standalone_tasks.len()
    }

    pub fn anchored(&self, task_id: &str) -> Option<&AnchoredTask> {
        self.anchored_tasks.iter().find(|t| t.task.id == task_id)
    }

    pub fn standalone(&self, task_id: &str) -> Option<&StandaloneTask> {
        self.standalone_tasks.iter().find(|t| t.task.id == task_id)
    }
}

/// Phase of an anchoring run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchoringPhase {
    Idle,
    SlotsComputed,
    Scored,
    Assigned,
    Finalized,
    Failed,
}

impl AnchoringPhase {
    pub fn can_transition_to(&self, to: &AnchoringPhase) -> bool {
        match self {
            AnchoringPhase::Idle => {
                matches!(to, AnchoringPhase::SlotsComputed | AnchoringPhase::Failed)
            }
            AnchoringPhase::SlotsComputed => matches!(to, AnchoringPhase::Scored),
            AnchoringPhase::Scored => matches!(to, AnchoringPhase::Assigned),
            AnchoringPhase::Assigned => matches!(to, AnchoringPhase::Finalized),
            AnchoringPhase::Finalized | AnchoringPhase::Failed => false, // Terminal
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AnchoringPhase::Finalized | AnchoringPhase::Failed)
    }
}

/// Bookkeeping for one run.
#[derive(Debug, Clone)]
pub struct AnchoringRun {
    pub run_id: Uuid,
    phase: AnchoringPhase,
    history: Vec<AnchoringPhase>,
}

impl AnchoringRun {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            phase: AnchoringPhase::Idle,
            history: vec![AnchoringPhase::Idle],
        }
    }

    pub fn phase(&self) -> AnchoringPhase {
        self.phase
    }

    /// Phases visited so far, starting with `Idle`.
    pub fn history(&self) -> &[AnchoringPhase] {
        &self.history
    }

    pub fn advance(&mut self, to: AnchoringPhase) -> Result<(), PhaseTransitionError> {
        if !self.phase.can_transition_to(&to) {
            return Err(PhaseTransitionError {
                from: self.phase,
                to,
            });
        }
        debug!(run_id = %self.run_id, from = ?self.phase, to = ?to, "run phase changed");
        self.phase = to;
        self.history.push(to);
        Ok(())
    }

    fn step(&mut self, to: AnchoringPhase) {
        if let Err(e) = self.advance(to) {
            warn!(run_id = %self.run_id, error = %e, "unexpected run phase change");
        }
    }
}

/// Run-wide values checked up front.
struct ValidatedRun {
    window: WorkingWindow,
    threshold: f64,
    default_start: NaiveTime,
}

/// Drives an anchoring run from request to result.
pub struct AnchoringCoordinator {
    config: AnchorConfig,
    provider: Option<Arc<dyn ScoringProvider>>,
}

impl AnchoringCoordinator {
    pub fn new(config: AnchorConfig) -> Self {
        Self {
            config,
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ScoringProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn gap_finder(&self) -> CalendarGapFinder {
        CalendarGapFinder::new()
            .with_buffer(self.config.gaps.buffer_minutes)
            .with_min_gap(self.config.gaps.min_gap_minutes)
    }

    /// Candidate slots for the request's calendar, without anchoring anything.
    pub fn compute_slots(
        &self,
        request: &AnchoringRequest,
    ) -> Result<Vec<CandidateSlot>, ConfigurationError> {
        let window = request
            .working_window
            .ok_or(ConfigurationError::MissingWindow)?;
        window.validate()?;
        Ok(self.gap_finder().find_slots(&request.events, &window))
    }

    /// Anchor the request's tasks onto its calendar.
    ///
    /// # Errors
    ///
    /// Only invalid inputs fail a run; see [`ConfigurationError`].
    pub async fn anchor(
        &self,
        request: &AnchoringRequest,
    ) -> Result<AnchoringResult, ConfigurationError> {
        let mut run = AnchoringRun::new(Uuid::new_v4());
        let run_id = run.run_id;

        let validated = match self.validate(request) {
            Ok(v) => v,
            Err(e) => {
                run.step(AnchoringPhase::Failed);
                warn!(run_id = %run_id, error = %e, "anchoring request rejected");
                return Err(e);
            }
        };

        let requested = request.mode.unwrap_or(self.config.default_mode);
        let pool = self.provider.as_ref().map(|provider| {
            Arc::new(ProviderPool::new(
                provider.clone(),
                self.config.provider.max_concurrency,
            ))
        });

        let mut mode = requested;
        let mut fallback_reason = None;
        if requested.uses_provider() && pool.is_none() {
            warn!(
                run_id = %run_id,
                mode = %requested,
                "no scoring provider configured, using deterministic mode"
            );
            mode = AnchoringMode::Deterministic;
            fallback_reason = Some(format!(
                "{requested} mode requested but no scoring provider is configured"
            ));
        }

        info!(
            run_id = %run_id,
            mode = %mode,
            tasks = request.tasks.len(),
            events = request.events.len(),
            threshold = validated.threshold,
            "starting anchoring run"
        );

        let slots = self
            .gap_finder()
            .find_slots(&request.events, &validated.window);
        run.step(AnchoringPhase::SlotsComputed);

        let outcome = if !slots.iter().any(|s| s.duration_minutes() > 0) {
            info!(run_id = %run_id, "no usable candidate slots, every task stays standalone");
            run.step(AnchoringPhase::Scored);
            AssignmentOutcome::all_unassigned(&request.tasks)
        } else {
            match (mode, pool) {
                (AnchoringMode::HolisticModelOnly, Some(pool)) => {
                    let adapter =
                        HolisticModeAdapter::new(pool.clone(), self.config.provider.holistic_timeout());
                    let context = DayContext {
                        day: validated.window.day(),
                        tasks: &request.tasks,
                        slots: &slots,
                        events: &request.events,
                        preferences: request.preferences.as_ref(),
                        confidence_threshold: validated.threshold,
                    };
                    match adapter.propose(run_id, context).await {
                        Ok(outcome) => {
                            run.step(AnchoringPhase::Scored);
                            outcome
                        }
                        Err(e) => {
                            warn!(
                                run_id = %run_id,
                                error = %e,
                                "holistic plan unusable, falling back to hybrid"
                            );
                            mode = AnchoringMode::Hybrid;
                            fallback_reason = Some(format!("{e}; fell back to hybrid"));
                            let scorer = self.hybrid_scorer(pool);
                            self.scored_outcome(&mut run, &scorer, request, &slots, validated.threshold)
                                .await
                        }
                    }
                }
                (AnchoringMode::Hybrid, Some(pool)) => {
                    let scorer = self.hybrid_scorer(pool);
                    self.scored_outcome(&mut run, &scorer, request, &slots, validated.threshold)
                        .await
                }
                _ => {
                    let scorer = self.deterministic_scorer();
                    self.scored_outcome(&mut run, &scorer, request, &slots, validated.threshold)
                        .await
                }
            }
        };
        run.step(AnchoringPhase::Assigned);

        let result = Self::assemble(
            run_id,
            mode,
            fallback_reason,
            &request.tasks,
            &slots,
            outcome,
            validated.window.day(),
            validated.default_start,
        );
        run.step(AnchoringPhase::Finalized);

        info!(
            run_id = %run_id,
            mode = %result.mode_used,
            anchored = result.anchored_tasks.len(),
            standalone = result.standalone_tasks.len(),
            "anchoring run finished"
        );
        Ok(result)
    }

    fn validate(&self, request: &AnchoringRequest) -> Result<ValidatedRun, ConfigurationError> {
        let window = request
            .working_window
            .ok_or(ConfigurationError::MissingWindow)?;
        window.validate()?;

        if request.tasks.is_empty() {
            return Err(ConfigurationError::EmptyTaskList);
        }

        let threshold = request
            .confidence_threshold
            .unwrap_or(self.config.confidence_threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigurationError::InvalidThreshold(threshold));
        }

        let mut seen = HashSet::new();
        for task in &request.tasks {
            if task.id.trim().is_empty() {
                return Err(ConfigurationError::InvalidTask {
                    task_id: task.id.clone(),
                    message: "task id is empty".to_string(),
                });
            }
            if task.duration_minutes <= 0 || task.duration_minutes > MAX_TASK_MINUTES {
                return Err(ConfigurationError::InvalidTask {
                    task_id: task.id.clone(),
                    message: format!(
                        "duration must be between 1 and {MAX_TASK_MINUTES} minutes, got {}",
                        task.duration_minutes
                    ),
                });
            }
            if let Some(window) = task.preferred_window {
                if window.end < window.start {
                    return Err(ConfigurationError::InvalidTask {
                        task_id: task.id.clone(),
                        message: "preferred window ends before it starts".to_string(),
                    });
                }
            }
            if !seen.insert(task.id.as_str()) {
                return Err(ConfigurationError::DuplicateTaskId(task.id.clone()));
            }
        }

        Ok(ValidatedRun {
            window,
            threshold,
            default_start: self.config.default_start()?,
        })
    }

    fn deterministic_scorer(&self) -> DeterministicScorer {
        DeterministicScorer::new().with_grace(self.config.scoring.grace_minutes)
    }

    fn hybrid_scorer(&self, pool: Arc<ProviderPool>) -> HybridScorer {
        let assisted = ModelAssistedScorer::new(
            pool,
            self.deterministic_scorer(),
            self.config.provider.pair_timeout(),
        );
        HybridScorer::new(self.deterministic_scorer(), assisted, self.config.scoring.top_k)
    }

    async fn scored_outcome(
        &self,
        run: &mut AnchoringRun,
        strategy: &dyn ScoringStrategy,
        request: &AnchoringRequest,
        slots: &[CandidateSlot],
        threshold: f64,
    ) -> AssignmentOutcome {
        let candidates = feasible_candidates(&request.tasks, slots);
        let scores = strategy.score_all(run.run_id, &candidates).await;
        debug!(
            run_id = %run.run_id,
            strategy = strategy.name(),
            pairs = scores.len(),
            "scored candidate pairs"
        );
        run.step(AnchoringPhase::Scored);

        GreedyAssignmentService::new(threshold).assign(&request.tasks, slots, &scores)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        run_id: Uuid,
        mode_used: AnchoringMode,
        fallback_reason: Option<String>,
        tasks: &[Task],
        slots: &[CandidateSlot],
        outcome: AssignmentOutcome,
        day: NaiveDate,
        default_start: NaiveTime,
    ) -> AnchoringResult {
        let slot_kinds: HashMap<&str, &SlotKind> =
            slots.iter().map(|s| (s.id.as_str(), &s.kind)).collect();
        let mut by_task: HashMap<String, Assignment> = outcome
            .assignments
            .into_iter()
            .map(|a| (a.task_id.clone(), a))
            .collect();

        let mut anchored_tasks = Vec::new();
        let mut standalone_tasks = Vec::new();
        for task in tasks {
            let assignment = by_task.remove(&task.id);
            let kind = assignment
                .as_ref()
                .and_then(|a| slot_kinds.get(a.slot_id.as_str()));
            match (assignment, kind) {
                (Some(a), Some(kind)) => anchored_tasks.push(AnchoredTask {
                    task: task.clone(),
                    anchored_time: a.anchored_time,
                    anchored_end: a.anchored_end,
                    anchored_to: SlotReference {
                        slot_id: a.slot_id,
                        kind: (*kind).clone(),
                    },
                    confidence: a.confidence,
                    rationale: a.rationale,
                    score_source: a.source,
                }),
                _ => {
                    let start_time = task.standalone_start(day, default_start);
                    standalone_tasks.push(StandaloneTask {
                        task: task.clone(),
                        start_time,
                        end_time: start_time + task.duration(),
                    });
                }
            }
        }

        let summary = format!(
            "Successfully anchored {} of {} tasks",
            anchored_tasks.len(),
            tasks.len()
        );

        AnchoringResult {
            run_id,
            mode_used,
            fallback_reason,
            anchored_tasks,
            standalone_tasks,
            summary,
        }
    }
}
