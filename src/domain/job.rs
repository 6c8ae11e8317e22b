//! Submission job record and related types
//!
//! A SubmissionJob is created by the orchestrator on admission, enriched with
//! advisory fields, and then moves through the queue/dispatch/retry loop until it
//! reaches a terminal status.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::advice::{Capability, ContentRequirements, CustomizedContent, FailureClassification, TimeWindow};
use crate::error::AdmissionError;
use crate::id::generate_job_id;

/// Reference to an external directory plus the business profile being listed.
///
/// The payload is opaque to the engine and only forwarded to providers and workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionTarget {
    pub directory_id: String,
    pub directory_url: String,
    pub business_id: String,
    pub business_name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl SubmissionTarget {
    pub fn new(
        directory_id: impl Into<String>,
        directory_url: impl Into<String>,
        business_id: impl Into<String>,
        business_name: impl Into<String>,
    ) -> Self {
        Self {
            directory_id: directory_id.into(),
            directory_url: directory_url.into(),
            business_id: business_id.into(),
            business_name: business_name.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Host of the directory URL, lowercased and without a leading `www.`
    pub fn directory_domain(&self) -> Option<String> {
        normalize_domain(&self.directory_url)
    }

    /// Check that every required identity field is present.
    pub fn validate(&self) -> Result<(), AdmissionError> {
        if self.directory_id.trim().is_empty() {
            return Err(AdmissionError::MissingField("directory_id"));
        }
        if self.directory_url.trim().is_empty() {
            return Err(AdmissionError::MissingField("directory_url"));
        }
        if self.business_id.trim().is_empty() {
            return Err(AdmissionError::MissingField("business_id"));
        }
        if self.business_name.trim().is_empty() {
            return Err(AdmissionError::MissingField("business_name"));
        }
        if self.directory_domain().is_none() {
            return Err(AdmissionError::InvalidUrl(self.directory_url.clone()));
        }
        Ok(())
    }
}

/// Extract the host of a URL-ish string.
///
/// Accepts bare domains (`example.com/add`) as well as full URLs. Returns None when
/// no plausible host can be found.
pub fn normalize_domain(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let without_scheme = match trimmed.split_once("://") {
        Some((scheme, rest)) => {
            if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.') {
                return None;
            }
            rest
        }
        None => trimmed,
    };

    let authority = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    // Drop userinfo and port
    let host = authority.rsplit('@').next().unwrap_or_default();
    let host = host.split(':').next().unwrap_or_default().to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    let valid = !host.is_empty()
        && host.contains('.')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
        && !host.starts_with('.')
        && !host.ends_with('.');

    valid.then_some(host)
}

/// Caller input to `Orchestrator::submit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub target: SubmissionTarget,
    /// Package tier ordinal, higher runs first
    pub priority_tier: u8,
    #[serde(default)]
    pub requirements: ContentRequirements,
}

impl SubmissionRequest {
    pub fn new(target: SubmissionTarget, priority_tier: u8) -> Self {
        Self {
            target,
            priority_tier,
            requirements: ContentRequirements::default(),
        }
    }

    pub fn with_requirements(mut self, requirements: ContentRequirements) -> Self {
        self.requirements = requirements;
        self
    }
}

/// Status of a submission job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Waiting in the queue (possibly delayed)
    Queued,
    /// Handed to a worker
    Dispatched,
    /// Worker reported success
    Completed,
    /// Worker reported failure, retry decision pending
    Failed,
    /// Retry budget spent or failure not fixable
    Exhausted,
    /// Removed by an operator
    Cancelled,
}

impl JobStatus {
    /// Returns true if the job will never change again
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Exhausted | JobStatus::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Dispatched)
                | (Queued, Cancelled)
                | (Dispatched, Completed)
                | (Dispatched, Failed)
                | (Dispatched, Cancelled)
                | (Dispatched, Queued)
                | (Failed, Queued)
                | (Failed, Exhausted)
                | (Failed, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Dispatched => "dispatched",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Exhausted => "exhausted",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An illegal status change was attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cannot move job from {} to {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

/// A unit of work for the external automation worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionJob {
    //=== Identity ===
    /// Unique identifier ("job-1738300800123-a1b2c3d4")
    pub id: String,

    /// Directory and business being submitted
    pub target: SubmissionTarget,

    /// Caller-supplied tier, dominant ordering key
    pub priority_tier: u8,

    //=== Advisory ===
    pub success_probability: f64,
    pub score_confidence: f64,
    pub optimal_window: Option<TimeWindow>,
    pub content_variant: Option<CustomizedContent>,
    pub experiment_assignments: BTreeMap<String, String>,
    /// Capabilities whose values are fallbacks rather than provider output
    pub fallbacks: Vec<Capability>,

    //=== Runtime State ===
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub last_failure: Option<FailureClassification>,

    //=== Timestamps ===
    pub created_at: DateTime<Utc>,
    pub scheduled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionJob {
    /// Create a queued job with neutral advisory fields.
    pub fn new(target: SubmissionTarget, priority_tier: u8, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            id: generate_job_id(),
            target,
            priority_tier,
            success_probability: 0.5,
            score_confidence: 0.0,
            optimal_window: None,
            content_variant: None,
            experiment_assignments: BTreeMap::new(),
            fallbacks: Vec::new(),
            attempt_count: 0,
            max_attempts,
            status: JobStatus::Queued,
            last_error: None,
            last_failure: None,
            created_at: now,
            scheduled_at: now,
            updated_at: now,
        }
    }

    /// Move to a new status, refusing transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Whether the job may be dequeued at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.scheduled_at
    }

    /// Time spent since admission
    pub fn wait_time(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
