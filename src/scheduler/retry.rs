//! Deterministic retry policy driven by failure classification.

use std::time::Duration;

use crate::domain::{FailureClassification, SubmissionJob};

/// Retry constants, all from configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Copied onto each job at admission
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of the backoff applied at zero analyzer confidence
    pub confidence_floor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(3600),
            confidence_floor: 0.5,
        }
    }
}

/// Outcome of `RetryScheduler::decide`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDecision {
    pub retry: bool,
    pub delay: Duration,
}

impl RetryDecision {
    pub fn give_up() -> Self {
        Self {
            retry: false,
            delay: Duration::ZERO,
        }
    }
}

/// Decides whether a failed job runs again, and when.
#[derive(Debug, Clone, Copy, Default)]
pub struct RetryScheduler {
    policy: RetryPolicy,
}

impl RetryScheduler {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Decide the fate of a failed job.
    ///
    /// - `attempt_count >= max_attempts`: no retry, whatever the classification
    /// - not fixable: no retry
    /// - otherwise: `min(base * 2^attempt, max) * (floor + (1 - floor) * confidence)`
    pub fn decide(&self, job: &SubmissionJob, classification: &FailureClassification) -> RetryDecision {
        if job.attempt_count >= job.max_attempts {
            return RetryDecision::give_up();
        }
        if !classification.is_fixable {
            return RetryDecision::give_up();
        }
        RetryDecision {
            retry: true,
            delay: self.backoff(job.attempt_count, classification.confidence),
        }
    }

    /// Backoff before retry number `attempt + 1`.
    pub fn backoff(&self, attempt: u32, confidence: f64) -> Duration {
        let exponential = 2u32
            .checked_pow(attempt)
            .and_then(|factor| self.policy.base_delay.checked_mul(factor))
            .unwrap_or(self.policy.max_delay);
        let capped = exponential.min(self.policy.max_delay);

        let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        let floor = self.policy.confidence_floor.clamp(0.0, 1.0);
        capped.mul_f64(floor + (1.0 - floor) * confidence)
    }
}
