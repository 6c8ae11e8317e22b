//! Advisory payloads exchanged with capability providers.
//!
//! Every provider response has a `validate` method; a response that fails it is
//! treated as a provider error and replaced by the fallback.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

/// The advisory capabilities the orchestrator consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    SuccessScorer,
    TimingAdvisor,
    TextCustomizer,
    FailureAnalyzer,
    ExperimentAssigner,
    FeedbackSink,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::SuccessScorer,
        Capability::TimingAdvisor,
        Capability::TextCustomizer,
        Capability::FailureAnalyzer,
        Capability::ExperimentAssigner,
        Capability::FeedbackSink,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::SuccessScorer => "success_scorer",
            Capability::TimingAdvisor => "timing_advisor",
            Capability::TextCustomizer => "text_customizer",
            Capability::FailureAnalyzer => "failure_analyzer",
            Capability::ExperimentAssigner => "experiment_assigner",
            Capability::FeedbackSink => "feedback_sink",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn check_unit(name: &str, value: f64) -> Result<(), ProviderError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ProviderError::Malformed(format!("{} {} outside [0,1]", name, value)))
    }
}

/// Output of the SuccessScorer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuccessScore {
    pub probability: f64,
    pub confidence: f64,
}

impl SuccessScore {
    pub fn validate(&self) -> Result<(), ProviderError> {
        check_unit("probability", self.probability)?;
        check_unit("confidence", self.confidence)
    }
}

/// A recommended submission window
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub score: f64,
}

/// Output of the TimingAdvisor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingAdvice {
    pub windows: Vec<TimeWindow>,
}

impl TimingAdvice {
    pub fn validate(&self) -> Result<(), ProviderError> {
        for window in &self.windows {
            if window.start >= window.end {
                return Err(ProviderError::Malformed(format!(
                    "window start {} not before end {}",
                    window.start, window.end
                )));
            }
            check_unit("window score", window.score)?;
        }
        Ok(())
    }

    /// Highest scoring window that has not already ended. Earlier start wins ties.
    pub fn best_window(&self, now: DateTime<Utc>) -> Option<TimeWindow> {
        self.windows
            .iter()
            .filter(|w| w.end > now)
            .copied()
            .max_by(|a, b| a.score.total_cmp(&b.score).then_with(|| b.start.cmp(&a.start)))
    }
}

/// Constraints handed to the TextCustomizer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentRequirements {
    pub max_length: Option<usize>,
    pub tone: Option<String>,
    pub keywords: Vec<String>,
}

/// Output of the TextCustomizer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomizedContent {
    pub text: String,
    pub variants: Vec<String>,
}

impl CustomizedContent {
    pub fn validate(&self, requirements: &ContentRequirements) -> Result<(), ProviderError> {
        if self.text.trim().is_empty() {
            return Err(ProviderError::Malformed("empty description".to_string()));
        }
        if let Some(max) = requirements.max_length
            && self.text.chars().count() > max
        {
            return Err(ProviderError::Malformed(format!("description longer than {} chars", max)));
        }
        Ok(())
    }
}

/// Failure families observed when submitting to directories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Captcha,
    FormChanged,
    RateLimited,
    Timeout,
    DirectoryUnavailable,
    ValidationRejected,
    Duplicate,
    WorkerLost,
    Unknown,
}

/// Output of the FailureAnalyzer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FailureClassification {
    pub category: FailureCategory,
    pub is_fixable: bool,
    pub confidence: f64,
}

impl FailureClassification {
    /// Neutral classification used when the analyzer is unavailable
    pub fn unknown() -> Self {
        Self {
            category: FailureCategory::Unknown,
            is_fixable: true,
            confidence: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        check_unit("confidence", self.confidence)
    }
}

/// What the FailureAnalyzer is asked to diagnose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureContext {
    pub job_id: String,
    pub target: crate::domain::SubmissionTarget,
    pub attempt_count: u32,
    pub details: String,
}

/// Output of the ExperimentAssigner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentAssignments {
    pub assignments: BTreeMap<String, String>,
}

impl ExperimentAssignments {
    pub fn validate(&self) -> Result<(), ProviderError> {
        for (experiment, variant) in &self.assignments {
            if experiment.trim().is_empty() || variant.trim().is_empty() {
                return Err(ProviderError::Malformed(format!(
                    "blank experiment assignment {:?} -> {:?}",
                    experiment, variant
                )));
            }
        }
        Ok(())
    }
}

/// Which model a feedback record is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    SuccessScorer,
    TimingAdvisor,
    TextCustomizer,
}

/// The prediction a feedback record grades
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub job_id: String,
    pub success_probability: f64,
    pub experiment_assignments: BTreeMap<String, String>,
    /// True when the prediction was a fallback, not a model output
    pub from_fallback: bool,
}
