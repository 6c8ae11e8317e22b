//! Advisory capability providers.
//!
//! The traits live in `traits`; `heuristic` holds deterministic built-ins used by
//! the simulator, and `mock` holds a scriptable test double.

pub mod heuristic;
pub mod mock;
mod traits;

use std::sync::Arc;

use crate::domain::{FailureClassification, SuccessScore};

pub use traits::{ExperimentAssigner, FailureAnalyzer, FeedbackSink, SuccessScorer, TextCustomizer, TimingAdvisor};

/// The full set of providers the orchestrator consults.
#[derive(Clone)]
pub struct Providers {
    pub scorer: Arc<dyn SuccessScorer>,
    pub timing: Arc<dyn TimingAdvisor>,
    pub text: Arc<dyn TextCustomizer>,
    pub analyzer: Arc<dyn FailureAnalyzer>,
    pub experiments: Arc<dyn ExperimentAssigner>,
    pub feedback: Arc<dyn FeedbackSink>,
}

impl Providers {
    /// Use one object for every capability.
    pub fn all<P>(provider: Arc<P>) -> Self
    where
        P: SuccessScorer + TimingAdvisor + TextCustomizer + FailureAnalyzer + ExperimentAssigner + FeedbackSink + 'static,
    {
        Self {
            scorer: provider.clone(),
            timing: provider.clone(),
            text: provider.clone(),
            analyzer: provider.clone(),
            experiments: provider.clone(),
            feedback: provider,
        }
    }

    /// Deterministic heuristics for every capability.
    pub fn heuristic() -> Self {
        Self {
            scorer: Arc::new(heuristic::AuthorityScorer),
            timing: Arc::new(heuristic::StaggeredAdvisor::default()),
            text: Arc::new(heuristic::TemplateCustomizer),
            analyzer: Arc::new(heuristic::KeywordAnalyzer),
            experiments: Arc::new(heuristic::HashAssigner::default()),
            feedback: Arc::new(heuristic::LoggingFeedback::default()),
        }
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}

/// Neutral values substituted when a provider is skipped or fails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fallbacks {
    pub success_probability: f64,
    pub score_confidence: f64,
}

impl Default for Fallbacks {
    fn default() -> Self {
        Self {
            success_probability: 0.5,
            score_confidence: 0.0,
        }
    }
}

impl Fallbacks {
    pub fn score(&self) -> SuccessScore {
        SuccessScore {
            probability: self.success_probability,
            confidence: self.score_confidence,
        }
    }

    pub fn classification(&self) -> FailureClassification {
        FailureClassification::unknown()
    }
}
