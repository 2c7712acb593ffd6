//! Retry policy
//!
//! Exponential backoff without jitter: base, 2x, 4x ... capped at a
//! maximum delay. Decisions live in one place so webhook and SMS retries
//! behave identically. The channels own the loop and the transport; this
//! module owns the arithmetic and the stop conditions.

use crate::config::RetryConfig;
use crate::types::DeliveryResult;
use std::time::Duration;

/// What the controller does after a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// The attempt succeeded.
    Delivered,
    /// Permanent rejection: client error or inactive destination.
    Rejected,
    /// Retry budget spent; keep the last failure.
    Exhausted,
    /// Transient failure; wait this long and go again.
    RetryAfter(Duration),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            // A zero-attempt policy would dispatch nothing.
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before the attempt following `attempt` (1-based):
    /// `base * 2^(attempt-1)`, capped at the configured maximum.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Decide the fate of a delivery after attempt `attempt` produced
    /// `result`. Stop conditions in order: success, HTTP 4xx, inactive
    /// destination, exhausted budget.
    pub fn assess(
        &self,
        result: &DeliveryResult,
        destination_active: bool,
        attempt: u32,
    ) -> RetryDecision {
        if result.success {
            return RetryDecision::Delivered;
        }
        if result.is_client_error() {
            return RetryDecision::Rejected;
        }
        if !destination_active {
            return RetryDecision::Rejected;
        }
        if attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }
        RetryDecision::RetryAfter(self.backoff_delay(attempt))
    }
}
