//! Cloud collaborator trait definition

use crate::error::Result;
use crate::inputs::ResolvedInputs;
use crate::resource::{ProvisionedResource, ResourceKind};
use async_trait::async_trait;
use std::time::Duration;

/// Cloud collaborator abstraction
///
/// One implementation covers every child resource kind. Each call is expected
/// to be idempotent on the collaborator side so that it can be retried after a
/// transient failure.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Returns the collaborator name (e.g., "local", "aws")
    fn name(&self) -> &str;

    /// Create a resource of `kind`
    async fn create(&self, kind: ResourceKind, inputs: &ResolvedInputs)
    -> Result<ProvisionedResource>;

    /// Update the resource `id` to match `inputs`
    async fn update(
        &self,
        kind: ResourceKind,
        id: &str,
        inputs: &ResolvedInputs,
    ) -> Result<ProvisionedResource>;

    /// Delete the resource `id`
    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<()>;

    /// Read the resource `id`; `None` if it no longer exists
    async fn read(&self, kind: ResourceKind, id: &str) -> Result<Option<ProvisionedResource>>;
}

/// Retry configuration for collaborator operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let delay_nanos = self.initial_delay.as_nanos() as f64 * factor;
        if !delay_nanos.is_finite() || delay_nanos >= self.max_delay.as_nanos() as f64 {
            self.max_delay
        } else {
            Duration::from_nanos(delay_nanos as u64)
        }
    }

    /// No retries and no waiting
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}
