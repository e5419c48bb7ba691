//! Scoring provider seam.
//!
//! A provider turns a prompt into raw model text. Everything model-specific
//! about parsing and validation lives with the callers, so a provider only has
//! to move bytes.

mod http;
mod parse;
mod pool;
pub mod prompt;

pub use http::HttpScoringProvider;
pub use parse::{extract_json, parse_pair_verdict, PairVerdict};
pub use pool::ProviderPool;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use crate::error::ProviderError;

/// What a completion request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestPurpose {
    /// Score one (task, slot) pair
    PairScore,
    /// Propose a whole day in one call
    DayPlan,
}

/// A single prompt sent to the provider.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub purpose: RequestPurpose,
    pub run_id: Uuid,
    pub system: String,
    pub prompt: String,
}

/// External language model used for scoring and day planning.
#[async_trait]
pub trait ScoringProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Return the model's raw text answer.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;
}
