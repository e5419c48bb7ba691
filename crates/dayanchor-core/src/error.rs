//! Core error types for dayanchor-core.
//!
//! Only [`ConfigurationError`] ever reaches the caller of an anchoring run.
//! Provider failures and proposal rejections are recovered inside the
//! pipeline and exist as types so they can be logged precisely.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDateTime;
use thiserror::Error;

/// Core error type for dayanchor-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid anchoring request
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// Configuration file errors
    #[error("Config file error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fatal problems with the inputs of a run. No partial result is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("working window is missing")]
    MissingWindow,

    #[error("invalid working window: end ({end}) must be after start ({start})")]
    InvalidWindow {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("task list is empty")]
    EmptyTaskList,

    #[error("confidence threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("invalid task '{task_id}': {message}")]
    InvalidTask { task_id: String, message: String },

    #[error("duplicate task id: {0}")]
    DuplicateTaskId(String),

    #[error("invalid setting '{key}': {message}")]
    InvalidSetting { key: String, message: String },
}

/// Configuration file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    #[error("Configuration directory unavailable: {0}")]
    DirectoryUnavailable(String),
}

/// Failures talking to the scoring provider.
///
/// All of these are absorbed by the scoring strategies and the holistic
/// adapter; they are never returned from a run.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("malformed provider response: {0}")]
    Malformed(String),

    #[error("invalid provider endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("provider API key not set (expected env var {0})")]
    MissingApiKey(String),

    #[error("provider pool is closed")]
    PoolClosed,
}

/// Reasons a holistic day proposal is rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProposalRejection {
    #[error("task '{0}' is missing from the proposal")]
    MissingTask(String),

    #[error("task '{0}' appears more than once")]
    DuplicateTask(String),

    #[error("proposal references unknown task '{0}'")]
    UnknownTask(String),

    #[error("confidence {confidence} for task '{task_id}' is outside [0, 1]")]
    InvalidConfidence { task_id: String, confidence: f64 },

    #[error("cannot parse time '{value}' for task '{task_id}'")]
    UnparseableTime { task_id: String, value: String },

    #[error("tasks '{first}' and '{second}' collide")]
    Collision { first: String, second: String },

    #[error("time {time} for task '{task_id}' is outside every free slot")]
    OutsideSlots { task_id: String, time: NaiveDateTime },

    #[error("task '{task_id}' needs slot '{slot_id}' which another task already claimed")]
    SlotConflict { task_id: String, slot_id: String },

    #[error("proposal body is malformed: {0}")]
    Malformed(String),
}

/// Invalid phase change in the anchoring state machine.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Invalid phase transition: {from:?} → {to:?}")]
pub struct PhaseTransitionError {
    pub from: crate::coordinator::AnchoringPhase,
    pub to: crate::coordinator::AnchoringPhase,
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
