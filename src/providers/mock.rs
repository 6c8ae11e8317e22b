//! Scriptable provider implementing every capability, for tests and demos.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{
    ContentRequirements, CustomizedContent, ExperimentAssignments, FailureCategory, FailureClassification,
    FailureContext, ModelType, Outcome, Prediction, SubmissionJob, SubmissionTarget, SuccessScore, TimeWindow,
    TimingAdvice,
};
use crate::error::ProviderError;
use crate::providers::traits::{
    ExperimentAssigner, FailureAnalyzer, FeedbackSink, SuccessScorer, TextCustomizer, TimingAdvisor,
};

/// How the mock answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Return the configured responses
    Succeed,
    /// Return `ProviderError::Failed`
    Fail,
    /// Sleep far beyond any sane timeout
    Hang,
    /// Return responses that violate the provider contract
    Malformed,
}

/// Test double for all six capabilities.
#[derive(Debug)]
pub struct MockProvider {
    behavior: Mutex<MockBehavior>,
    calls: AtomicUsize,
    score: Mutex<SuccessScore>,
    classification: Mutex<FailureClassification>,
    assignments: Mutex<ExperimentAssignments>,
    feedback: Mutex<Vec<(ModelType, Prediction, Outcome)>>,
}

impl MockProvider {
    pub fn new(behavior: MockBehavior) -> Self {
        let mut assignments = ExperimentAssignments::default();
        assignments
            .assignments
            .insert("description_style".to_string(), "concise".to_string());
        Self {
            behavior: Mutex::new(behavior),
            calls: AtomicUsize::new(0),
            score: Mutex::new(SuccessScore {
                probability: 0.8,
                confidence: 0.9,
            }),
            classification: Mutex::new(FailureClassification {
                category: FailureCategory::Timeout,
                is_fixable: true,
                confidence: 1.0,
            }),
            assignments: Mutex::new(assignments),
            feedback: Mutex::new(Vec::new()),
        }
    }

    pub fn healthy() -> Self {
        Self::new(MockBehavior::Succeed)
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Fail)
    }

    pub fn hanging() -> Self {
        Self::new(MockBehavior::Hang)
    }

    pub fn with_score(self, probability: f64, confidence: f64) -> Self {
        *self.score.lock().unwrap_or_else(|e| e.into_inner()) = SuccessScore { probability, confidence };
        self
    }

    pub fn with_classification(self, classification: FailureClassification) -> Self {
        *self.classification.lock().unwrap_or_else(|e| e.into_inner()) = classification;
        self
    }

    pub fn set_score(&self, probability: f64, confidence: f64) {
        *self.score.lock().unwrap_or_else(|e| e.into_inner()) = SuccessScore { probability, confidence };
    }

    pub fn set_behavior(&self, behavior: MockBehavior) {
        *self.behavior.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    /// Number of provider invocations across all capabilities
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn feedback_records(&self) -> Vec<(ModelType, Prediction, Outcome)> {
        self.feedback.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Count the call and apply Fail/Hang. Returns the behavior for Succeed/Malformed.
    async fn enter(&self) -> Result<MockBehavior, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap_or_else(|e| e.into_inner());
        match behavior {
            MockBehavior::Fail => Err(ProviderError::Failed("mock failure".to_string())),
            MockBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::Failed("mock hang elapsed".to_string()))
            }
            other => Ok(other),
        }
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::healthy()
    }
}

#[async_trait]
impl SuccessScorer for MockProvider {
    async fn score(&self, _target: &SubmissionTarget) -> Result<SuccessScore, ProviderError> {
        match self.enter().await? {
            MockBehavior::Malformed => Ok(SuccessScore {
                probability: 1.5,
                confidence: 0.5,
            }),
            _ => Ok(*self.score.lock().unwrap_or_else(|e| e.into_inner())),
        }
    }
}

#[async_trait]
impl TimingAdvisor for MockProvider {
    async fn recommend(&self, _target_id: &str, _priority: u8) -> Result<TimingAdvice, ProviderError> {
        let now = Utc::now();
        let window = match self.enter().await? {
            MockBehavior::Malformed => TimeWindow {
                start: now,
                end: now - chrono::Duration::hours(1),
                score: 0.5,
            },
            _ => TimeWindow {
                start: now - chrono::Duration::minutes(5),
                end: now + chrono::Duration::hours(1),
                score: 0.7,
            },
        };
        Ok(TimingAdvice { windows: vec![window] })
    }
}

#[async_trait]
impl TextCustomizer for MockProvider {
    async fn customize(
        &self,
        target: &SubmissionTarget,
        _requirements: &ContentRequirements,
    ) -> Result<CustomizedContent, ProviderError> {
        match self.enter().await? {
            MockBehavior::Malformed => Ok(CustomizedContent::default()),
            _ => Ok(CustomizedContent {
                text: format!("{} on {}", target.business_name, target.directory_id),
                variants: vec![format!("{} (alt)", target.business_name)],
            }),
        }
    }
}

#[async_trait]
impl FailureAnalyzer for MockProvider {
    async fn classify(&self, _context: &FailureContext) -> Result<FailureClassification, ProviderError> {
        match self.enter().await? {
            MockBehavior::Malformed => Ok(FailureClassification {
                category: FailureCategory::Captcha,
                is_fixable: false,
                confidence: 7.0,
            }),
            _ => Ok(*self.classification.lock().unwrap_or_else(|e| e.into_inner())),
        }
    }
}

#[async_trait]
impl ExperimentAssigner for MockProvider {
    async fn assign(&self, _job: &SubmissionJob) -> Result<ExperimentAssignments, ProviderError> {
        match self.enter().await? {
            MockBehavior::Malformed => {
                let mut bad = ExperimentAssignments::default();
                bad.assignments.insert(String::new(), "a".to_string());
                Ok(bad)
            }
            _ => Ok(self.assignments.lock().unwrap_or_else(|e| e.into_inner()).clone()),
        }
    }
}

#[async_trait]
impl FeedbackSink for MockProvider {
    async fn record(
        &self,
        model_type: ModelType,
        prediction: &Prediction,
        outcome: &Outcome,
    ) -> Result<(), ProviderError> {
        match self.enter().await? {
            MockBehavior::Malformed => Err(ProviderError::Malformed("feedback rejected".to_string())),
            _ => {
                self.feedback
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push((model_type, prediction.clone(), outcome.clone()));
                Ok(())
            }
        }
    }
}
