//! Bounded, timeout-enforcing access to a scoring provider.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::time::timeout as tokio_timeout;
use tracing::debug;

use super::{CompletionRequest, ScoringProvider};
use crate::error::ProviderError;

/// Caps concurrent provider calls and applies a per-call deadline.
///
/// The timeout covers the provider call itself, not the wait for a permit.
#[derive(Clone)]
pub struct ProviderPool {
    provider: Arc<dyn ScoringProvider>,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
}

impl ProviderPool {
    pub fn new(provider: Arc<dyn ScoringProvider>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn call(
        &self,
        request: &CompletionRequest,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ProviderError::PoolClosed)?;

        debug!(
            run_id = %request.run_id,
            purpose = ?request.purpose,
            provider = self.provider.name(),
            "calling scoring provider"
        );

        tokio_timeout(timeout, self.provider.complete(request))
            .await
            .map_err(|_| ProviderError::Timeout(timeout))?
    }
}
