//! Worker outcome reports and the engine's answers to them.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::advice::FailureClassification;
use crate::error::ProtocolError;

/// What a worker reports after attempting a submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    #[serde(default)]
    pub details: String,
}

impl Outcome {
    pub fn success(details: impl Into<String>) -> Self {
        Self {
            success: true,
            details: details.into(),
        }
    }

    pub fn failure(details: impl Into<String>) -> Self {
        Self {
            success: false,
            details: details.into(),
        }
    }
}

/// How the orchestrator handled an outcome report.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Job is now Completed
    Completed,
    /// Job re-entered the queue after a delay
    Requeued {
        attempt: u32,
        delay: Duration,
        classification: FailureClassification,
    },
    /// Job is now Exhausted
    Exhausted { classification: FailureClassification },
    /// Report refused; nothing changed
    Ignored(ProtocolError),
}

impl Disposition {
    pub fn is_ignored(&self) -> bool {
        matches!(self, Disposition::Ignored(_))
    }
}

/// Answer to a worker heartbeat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatAck {
    /// Keep working
    Continue,
    /// The job was cancelled; the worker should stop if it can
    Cancel,
    /// Heartbeat refused; nothing changed
    Ignored(ProtocolError),
}

/// Result of `Orchestrator::cancel`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelResult {
    /// Removed from the queue before any worker saw it
    Removed,
    /// Already with a worker; later reports will be refused
    Advisory,
    /// Job was already terminal; nothing changed
    AlreadyTerminal,
    /// No such job
    NotFound,
}
