//! Job ordering and retry policy.
//!
//! This module provides:
//! - **PriorityKey**: composite ordering (tier, success probability, wait time).
//! - **PriorityQueue**: ready heap plus delayed holding area under one mutex.
//! - **RetryScheduler**: deterministic backoff driven by failure classification.

mod priority;
mod queue;
mod retry;

pub use priority::{DueKey, PriorityKey};
pub use queue::{PriorityQueue, QueueStats};
pub use retry::{RetryDecision, RetryPolicy, RetryScheduler};
