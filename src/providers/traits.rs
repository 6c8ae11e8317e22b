//! Capability interfaces for advisory providers.
//!
//! Each trait is deliberately narrow. The orchestrator only ever holds
//! `Arc<dyn Trait>` and only ever calls through `execute_guarded`.

use async_trait::async_trait;

use crate::domain::{
    ContentRequirements, CustomizedContent, ExperimentAssignments, FailureClassification, FailureContext, ModelType,
    Outcome, Prediction, SubmissionJob, SubmissionTarget, SuccessScore, TimingAdvice,
};
use crate::error::ProviderError;

/// Estimates how likely a submission is to be accepted
#[async_trait]
pub trait SuccessScorer: Send + Sync {
    async fn score(&self, target: &SubmissionTarget) -> Result<SuccessScore, ProviderError>;
}

/// Suggests when a directory is most receptive
#[async_trait]
pub trait TimingAdvisor: Send + Sync {
    async fn recommend(&self, target_id: &str, priority: u8) -> Result<TimingAdvice, ProviderError>;
}

/// Writes a directory-specific business description
#[async_trait]
pub trait TextCustomizer: Send + Sync {
    async fn customize(
        &self,
        target: &SubmissionTarget,
        requirements: &ContentRequirements,
    ) -> Result<CustomizedContent, ProviderError>;
}

/// Diagnoses a failed submission
#[async_trait]
pub trait FailureAnalyzer: Send + Sync {
    async fn classify(&self, context: &FailureContext) -> Result<FailureClassification, ProviderError>;
}

/// Places a job into A/B experiments
#[async_trait]
pub trait ExperimentAssigner: Send + Sync {
    async fn assign(&self, job: &SubmissionJob) -> Result<ExperimentAssignments, ProviderError>;
}

/// Receives graded predictions for model training
#[async_trait]
pub trait FeedbackSink: Send + Sync {
    async fn record(&self, model_type: ModelType, prediction: &Prediction, outcome: &Outcome)
    -> Result<(), ProviderError>;
}
