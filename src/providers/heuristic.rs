//! Deterministic built-in providers.
//!
//! No models behind these: they exist so the engine can run end to end in the
//! simulator and in local setups without any advisory service.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
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

/// Scores by the directory's domain authority (`payload.domain_authority`).
///
/// High-authority directories are harder to get into, so they score lower.
#[derive(Debug, Default, Clone, Copy)]
pub struct AuthorityScorer;

#[async_trait]
impl SuccessScorer for AuthorityScorer {
    async fn score(&self, target: &SubmissionTarget) -> Result<SuccessScore, ProviderError> {
        let authority = target.payload.get("domain_authority").and_then(|v| v.as_f64());
        let score = match authority {
            Some(da) if da >= 70.0 => SuccessScore {
                probability: 0.35,
                confidence: 0.6,
            },
            Some(da) if da >= 40.0 => SuccessScore {
                probability: 0.55,
                confidence: 0.6,
            },
            Some(_) => SuccessScore {
                probability: 0.75,
                confidence: 0.6,
            },
            None => SuccessScore {
                probability: 0.5,
                confidence: 0.2,
            },
        };
        Ok(score)
    }
}

/// Offers one window per request; lower tiers start later.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaggeredAdvisor {
    /// Delay added per tier below the top tier (3)
    pub stagger: Duration,
}

const TOP_TIER: u8 = 3;

#[async_trait]
impl TimingAdvisor for StaggeredAdvisor {
    async fn recommend(&self, _target_id: &str, priority: u8) -> Result<TimingAdvice, ProviderError> {
        let steps = TOP_TIER.saturating_sub(priority.min(TOP_TIER));
        let offset = chrono::Duration::from_std(self.stagger * u32::from(steps))
            .map_err(|e| ProviderError::Failed(e.to_string()))?;
        let start = Utc::now() + offset;
        Ok(TimingAdvice {
            windows: vec![TimeWindow {
                start,
                end: start + chrono::Duration::hours(1),
                score: 0.5 + 0.1 * f64::from(priority.min(TOP_TIER)),
            }],
        })
    }
}

/// Fills a fixed description template.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateCustomizer;

fn truncate_chars(text: &str, max: Option<usize>) -> String {
    match max {
        Some(max) => text.chars().take(max).collect(),
        None => text.to_string(),
    }
}

#[async_trait]
impl TextCustomizer for TemplateCustomizer {
    async fn customize(
        &self,
        target: &SubmissionTarget,
        requirements: &ContentRequirements,
    ) -> Result<CustomizedContent, ProviderError> {
        let domain = target.directory_domain().unwrap_or_else(|| target.directory_id.clone());
        let mut text = format!("{} is now listed on {}.", target.business_name, domain);
        if !requirements.keywords.is_empty() {
            text.push_str(&format!(" {}.", requirements.keywords.join(", ")));
        }
        let tone = requirements.tone.as_deref().unwrap_or("neutral");
        let variant = format!("{} ({} tone)", target.business_name, tone);

        Ok(CustomizedContent {
            text: truncate_chars(&text, requirements.max_length),
            variants: vec![truncate_chars(&variant, requirements.max_length)],
        })
    }
}

/// Classifies failures by keywords in the worker's report.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordAnalyzer;

impl KeywordAnalyzer {
    fn rule(details: &str) -> (FailureCategory, bool, f64) {
        let details = details.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| details.contains(w));

        if has(&["captcha", "recaptcha", "hcaptcha"]) {
            (FailureCategory::Captcha, false, 0.8)
        } else if has(&["rate limit", "429", "too many requests"]) {
            (FailureCategory::RateLimited, true, 0.9)
        } else if has(&["lease expired", "worker lost"]) {
            (FailureCategory::WorkerLost, true, 0.9)
        } else if has(&["timeout", "timed out"]) {
            (FailureCategory::Timeout, true, 0.7)
        } else if has(&["duplicate", "already listed", "already exists"]) {
            (FailureCategory::Duplicate, false, 0.9)
        } else if has(&["404", "503", "unavailable", "unreachable"]) {
            (FailureCategory::DirectoryUnavailable, true, 0.4)
        } else if has(&["selector", "field", "form"]) {
            (FailureCategory::FormChanged, true, 0.5)
        } else if has(&["rejected", "invalid"]) {
            (FailureCategory::ValidationRejected, false, 0.6)
        } else {
            (FailureCategory::Unknown, true, 0.2)
        }
    }
}

#[async_trait]
impl FailureAnalyzer for KeywordAnalyzer {
    async fn classify(&self, context: &FailureContext) -> Result<FailureClassification, ProviderError> {
        let (category, is_fixable, confidence) = Self::rule(&context.details);
        Ok(FailureClassification {
            category,
            is_fixable,
            confidence,
        })
    }
}

/// Buckets jobs into variants by hashing the job id.
#[derive(Debug, Clone)]
pub struct HashAssigner {
    experiments: Vec<(String, Vec<String>)>,
}

impl HashAssigner {
    pub fn new(experiments: Vec<(String, Vec<String>)>) -> Self {
        Self { experiments }
    }
}

impl Default for HashAssigner {
    fn default() -> Self {
        Self::new(vec![
            (
                "description_style".to_string(),
                vec!["concise".to_string(), "detailed".to_string()],
            ),
            (
                "submission_timing".to_string(),
                vec!["immediate".to_string(), "windowed".to_string()],
            ),
        ])
    }
}

#[async_trait]
impl ExperimentAssigner for HashAssigner {
    async fn assign(&self, job: &SubmissionJob) -> Result<ExperimentAssignments, ProviderError> {
        let mut out = ExperimentAssignments::default();
        for (experiment, variants) in &self.experiments {
            if variants.is_empty() {
                continue;
            }
            let mut hasher = DefaultHasher::new();
            job.id.hash(&mut hasher);
            experiment.hash(&mut hasher);
            let index = (hasher.finish() % variants.len() as u64) as usize;
            out.assignments.insert(experiment.clone(), variants[index].clone());
        }
        Ok(out)
    }
}

/// Logs feedback records and counts them.
#[derive(Debug, Default)]
pub struct LoggingFeedback {
    successes: AtomicU64,
    failures: AtomicU64,
}

impl LoggingFeedback {
    /// (successes, failures) recorded so far
    pub fn recorded(&self) -> (u64, u64) {
        (self.successes.load(Ordering::Relaxed), self.failures.load(Ordering::Relaxed))
    }
}

#[async_trait]
impl FeedbackSink for LoggingFeedback {
    async fn record(
        &self,
        model_type: ModelType,
        prediction: &Prediction,
        outcome: &Outcome,
    ) -> Result<(), ProviderError> {
        if outcome.success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        tracing::debug!(
            job_id = %prediction.job_id,
            model = ?model_type,
            predicted = prediction.success_probability,
            success = outcome.success,
            "Feedback recorded"
        );
        Ok(())
    }
}
