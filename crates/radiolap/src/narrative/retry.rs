//! Bounded retry with exponential backoff.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use super::{NarrativeError, NarrativeGenerator, Prompt, Result};

/// How many attempts to make and how long to wait between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Base of the exponential delay.
    pub multiplier: Duration,
    /// Lower clamp for every delay.
    pub min_delay: Duration,
    /// Upper clamp for every delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            multiplier: Duration::from_secs(1),
            min_delay: Duration::from_secs(4),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// A policy that retries immediately.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            multiplier: Duration::ZERO,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the `retry`-th failure (zero-based): `multiplier * 2^retry`,
    /// clamped to `[min_delay, max_delay]`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        self.multiplier
            .saturating_mul(factor)
            .max(self.min_delay)
            .min(self.max_delay)
    }
}

/// Wraps a generator with a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Retrying<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G> Retrying<G> {
    /// Wrap `inner`.
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped generator.
    pub fn inner(&self) -> &G {
        &self.inner
    }
}

#[async_trait]
impl<G: NarrativeGenerator> NarrativeGenerator for Retrying<G> {
    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        let attempts = self.policy.max_attempts.max(1);
        let mut retry = 0;
        loop {
            match self.inner.generate(prompt).await {
                Ok(text) => return Ok(text),
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if retry + 1 >= attempts => {
                    return Err(NarrativeError::Exhausted {
                        attempts,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    let delay = self.policy.delay_for(retry);
                    retry += 1;
                    warn!(
                        attempt = retry,
                        max_attempts = attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "narrative request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
