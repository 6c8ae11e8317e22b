//! Wiring for an `Orchestrator`: providers, repository and event sinks.

use std::sync::Arc;

use crate::config::GlobalConfig;
use crate::error::Result;
use crate::metrics::{EventSink, FanoutSink, MetricsAggregator};
use crate::orchestrator::engine::{EngineParts, Orchestrator};
use crate::providers::Providers;
use crate::resilience::CircuitBreakerRegistry;
use crate::scheduler::PriorityQueue;
use crate::storage::{self, JobRepository};

/// Builds an `Orchestrator` from a validated config.
///
/// Unset collaborators default to the heuristic providers and the repository
/// named by `storage.backend`.
pub struct OrchestratorBuilder {
    config: GlobalConfig,
    providers: Option<Providers>,
    repository: Option<Arc<dyn JobRepository>>,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl OrchestratorBuilder {
    pub fn new(config: GlobalConfig) -> Self {
        Self {
            config,
            providers: None,
            repository: None,
            sinks: Vec::new(),
        }
    }

    pub fn providers(mut self, providers: Providers) -> Self {
        self.providers = Some(providers);
        self
    }

    pub fn repository(mut self, repository: Arc<dyn JobRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Receive every engine event alongside the built-in metrics aggregator.
    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        self.config.validate()?;

        let repository = match self.repository {
            Some(repository) => repository,
            None => storage::open_repository(&self.config.storage)?,
        };
        let providers = self.providers.unwrap_or_else(Providers::heuristic);

        let metrics = MetricsAggregator::new();
        let mut sinks: Vec<Arc<dyn EventSink>> = vec![metrics.clone() as Arc<dyn EventSink>];
        sinks.extend(self.sinks);
        let events: Arc<dyn EventSink> = Arc::new(FanoutSink::new(sinks));

        let config = self.config;
        let registry = CircuitBreakerRegistry::new(events.clone(), |cap| config.breaker_config(cap));
        let queue = Arc::new(PriorityQueue::new(events.clone()));

        tracing::debug!(backend = ?config.storage.backend, "Orchestrator built");
        Ok(Orchestrator::from_parts(EngineParts {
            config,
            providers,
            registry,
            queue,
            repository,
            events,
            metrics,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageBackend;
    use crate::domain::{Capability, SubmissionRequest, SubmissionTarget};
    use crate::metrics::RecordingSink;
    use crate::resilience::BreakerState;
    use tempfile::TempDir;

    #[test]
    fn test_build_rejects_invalid_config() {
        let mut config = GlobalConfig::default();
        config.breaker.failure_threshold = 0;
        assert!(OrchestratorBuilder::new(config).build().is_err());
    }

    #[test]
    fn test_breakers_use_overrides() {
        let mut config = GlobalConfig::default();
        config.breaker.overrides.insert(
            Capability::TimingAdvisor,
            crate::config::BreakerOverride {
                failure_threshold: Some(1),
                reset_timeout_ms: None,
            },
        );
        let engine = OrchestratorBuilder::new(config).build().unwrap();
        let snapshots = engine.breakers().snapshots();
        let timing = snapshots.iter().find(|s| s.service_name == "timing_advisor").unwrap();
        assert_eq!(timing.failure_threshold, 1);
        let scorer = snapshots.iter().find(|s| s.service_name == "success_scorer").unwrap();
        assert_eq!(scorer.failure_threshold, 5);
        assert!(engine.breakers().states().iter().all(|(_, s)| *s == BreakerState::Closed));
    }

    #[tokio::test]
    async fn test_extra_sink_receives_events() {
        let recorder = RecordingSink::new();
        let engine = OrchestratorBuilder::new(GlobalConfig::default())
            .event_sink(recorder.clone())
            .build()
            .unwrap();
        let target = SubmissionTarget::new("yelp", "https://yelp.com", "biz-1", "Acme");
        engine.submit(SubmissionRequest::new(target, 1)).await.unwrap();

        assert!(!recorder.events().is_empty());
        assert_eq!(engine.metrics().total_submitted, 1);
    }

    #[tokio::test]
    async fn test_jsonl_backend_from_config() {
        let temp = TempDir::new().unwrap();
        let mut config = GlobalConfig::default();
        config.storage.backend = StorageBackend::Jsonl;
        config.storage.jsonl_dir = temp.path().to_path_buf();

        let engine = OrchestratorBuilder::new(config).build().unwrap();
        let target = SubmissionTarget::new("yelp", "https://yelp.com", "biz-1", "Acme");
        engine.submit(SubmissionRequest::new(target, 1)).await.unwrap();
        assert!(temp.path().join("jobs.jsonl").exists());
    }
}
