//! Rate-limit retry around skill calls
//!
//! Only rate limiting is retried. Anything else propagates immediately so
//! real failures surface at the item that caused them.

use std::time::Duration;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::a2a::SkillReply;
use crate::skill::{SkillError, SkillInvoker};

/// Substrings that mark an error as rate limiting, matched case-insensitively
/// against the error's display text.
pub const RATE_LIMIT_MARKERS: [&str; 4] = ["429", "quota", "resource exhausted", "rate limit"];

pub fn is_rate_limited(error: &SkillError) -> bool {
    let text = error.to_string().to_lowercase();
    RATE_LIMIT_MARKERS.iter().any(|marker| text.contains(marker))
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(12),
        }
    }
}

impl RetryPolicy {
    /// Delay before re-attempting after failed attempt `attempt` (0-based):
    /// `base_delay * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }
}

/// Wraps any invoker with the rate-limit retry policy.
pub struct RetryingInvoker<I> {
    inner: I,
    policy: RetryPolicy,
}

impl<I> RetryingInvoker<I> {
    pub fn new(inner: I, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait::async_trait]
impl<I: SkillInvoker> SkillInvoker for RetryingInvoker<I> {
    async fn invoke(
        &self,
        agent: &str,
        skill: &str,
        input: Value,
    ) -> Result<SkillReply, SkillError> {
        let mut last: Option<SkillError> = None;

        for attempt in 0..self.policy.max_retries {
            match self.inner.invoke(agent, skill, input.clone()).await {
                Ok(reply) => {
                    if attempt > 0 {
                        info!("{}.{} succeeded on attempt {}", agent, skill, attempt + 1);
                    }
                    return Ok(reply);
                }
                Err(err) if is_rate_limited(&err) => {
                    if attempt + 1 < self.policy.max_retries {
                        let delay = self.policy.delay_for(attempt);
                        warn!(
                            "Rate limit calling {}.{} (attempt {}/{}), retrying in {:?}: {}",
                            agent,
                            skill,
                            attempt + 1,
                            self.policy.max_retries,
                            delay,
                            err
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last = Some(err);
                }
                Err(err) => {
                    error!("{}.{} failed: {}", agent, skill, err);
                    return Err(err);
                }
            }
        }

        Err(SkillError::RetriesExhausted {
            agent: agent.to_string(),
            skill: skill.to_string(),
            attempts: self.policy.max_retries,
            last: last.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}
