//! In-process worker pool that drives an orchestrator end to end.
//!
//! Each worker pulls jobs with `dequeue_wait`, heartbeats, "submits" for
//! `work-ms`, reports a seeded random outcome and pauses `pacing-ms` before the
//! next job. The run ends once every admitted job is terminal.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::{GlobalConfig, SimulateConfig};
use crate::domain::{HeartbeatAck, Outcome, SubmissionRequest};
use crate::error::Result;
use crate::id::generate_worker_id;
use crate::metrics::MetricsSnapshot;
use crate::orchestrator::{Orchestrator, OrchestratorBuilder, Sweeper};
use crate::providers::{Providers, heuristic};
use crate::runner::targets::{BusinessProfile, DirectoryEntry};

/// Failure details a simulated worker reports
const FAILURE_DETAILS: [&str; 5] = [
    "captcha challenge on submit page",
    "timeout waiting for listing form",
    "HTTP 503 service unavailable",
    "form field 'business_phone' not found",
    "listing rejected: duplicate business",
];

/// Longest a worker waits on an empty queue before rechecking for completion
const IDLE_WAIT: Duration = Duration::from_millis(250);

/// Summary of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Newly admitted jobs
    pub submitted: usize,
    pub rejected: usize,
    /// Outcome counts cover resumed jobs as well
    pub completed: usize,
    pub exhausted: usize,
    pub cancelled: usize,
    /// Jobs each worker processed, by worker id
    pub per_worker: BTreeMap<String, usize>,
    pub elapsed_ms: u64,
    pub metrics: MetricsSnapshot,
}

/// Owns an orchestrator built for simulation and the pool that works it.
pub struct Simulation {
    orchestrator: Arc<Orchestrator>,
    settings: SimulateConfig,
    business: BusinessProfile,
}

impl Simulation {
    /// Build with the heuristic providers and the simulated retry backoff.
    pub fn new(config: GlobalConfig) -> Result<Self> {
        let stagger = Duration::from_millis(config.simulate.stagger_ms);
        let mut providers = Providers::heuristic();
        providers.timing = Arc::new(heuristic::StaggeredAdvisor { stagger });
        Self::with_providers(config, providers)
    }

    pub fn with_providers(mut config: GlobalConfig, providers: Providers) -> Result<Self> {
        let settings = config.simulate.clone();
        config.retry.base_delay_ms = settings.retry_delay_ms;
        config.retry.max_delay_ms = config.retry.max_delay_ms.max(settings.retry_delay_ms);

        let orchestrator = OrchestratorBuilder::new(config).providers(providers).build()?;
        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            settings,
            business: BusinessProfile::default(),
        })
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// Submit every directory, then work the queue until nothing is left.
    pub async fn run(&self, directories: &[DirectoryEntry]) -> Result<SimulationReport> {
        let started = Instant::now();
        let recovered = self.orchestrator.recover().await?;
        if recovered.jobs_restored > 0 {
            tracing::info!(jobs = recovered.jobs_restored, "Resuming jobs from a previous run");
        }

        let mut submitted = 0;
        let mut rejected = 0;
        for entry in directories {
            let tier = entry.priority_tier.unwrap_or(1);
            let request = SubmissionRequest::new(entry.to_target(&self.business), tier);
            match self.orchestrator.submit(request).await {
                Ok(_) => submitted += 1,
                Err(e) => {
                    tracing::warn!(directory = %entry.name, error = %e, "Directory not admitted");
                    rejected += 1;
                }
            }
        }
        // Includes jobs resumed from the repository
        let job_ids = Arc::new(self.orchestrator.active_job_ids());

        let sweeper = Sweeper::spawn(self.orchestrator.clone(), self.orchestrator.config().sweep_interval());
        let handles: Vec<_> = (0..self.settings.workers)
            .map(|index| {
                let worker = SimulatedWorker {
                    id: generate_worker_id(index),
                    orchestrator: self.orchestrator.clone(),
                    job_ids: job_ids.clone(),
                    rng: StdRng::seed_from_u64(self.settings.seed.wrapping_add(index as u64)),
                    success_rate: self.settings.success_rate,
                    work: Duration::from_millis(self.settings.work_ms),
                    pacing: Duration::from_millis(self.settings.pacing_ms),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        let mut per_worker = BTreeMap::new();
        for result in futures::future::join_all(handles).await {
            match result {
                Ok((worker_id, processed)) => {
                    per_worker.insert(worker_id, processed);
                }
                Err(e) => tracing::error!(error = %e, "Simulated worker panicked"),
            }
        }
        sweeper.shutdown().await;
        self.orchestrator.persist_breakers().await;

        // Every terminal event this engine has seen belongs to a job of this run
        let metrics = self.orchestrator.metrics();
        let report = SimulationReport {
            submitted,
            rejected,
            completed: metrics.total_completed as usize,
            exhausted: metrics.total_exhausted as usize,
            cancelled: metrics.total_cancelled as usize,
            per_worker,
            elapsed_ms: started.elapsed().as_millis() as u64,
            metrics,
        };
        tracing::info!(
            submitted = report.submitted,
            completed = report.completed,
            exhausted = report.exhausted,
            elapsed_ms = report.elapsed_ms,
            "Simulation finished"
        );
        Ok(report)
    }
}

struct SimulatedWorker {
    id: String,
    orchestrator: Arc<Orchestrator>,
    job_ids: Arc<Vec<String>>,
    rng: StdRng,
    success_rate: f64,
    work: Duration,
    pacing: Duration,
}

impl SimulatedWorker {
    fn all_settled(&self) -> bool {
        // Only finished jobs leave the index, so an id nobody knows is settled
        self.job_ids.iter().all(|id| {
            self.orchestrator
                .job_status(id)
                .map(|status| status.is_terminal())
                .unwrap_or(true)
        })
    }

    async fn run(mut self) -> (String, usize) {
        let mut processed = 0;
        while !self.all_settled() {
            let Some(job) = self.orchestrator.dequeue_wait(&self.id, IDLE_WAIT).await else {
                continue;
            };
            processed += 1;

            tokio::time::sleep(self.work / 2).await;
            if self.orchestrator.heartbeat(&self.id, &job.id, 0.5) == HeartbeatAck::Cancel {
                tracing::info!(worker_id = %self.id, job_id = %job.id, "Job cancelled mid-submission");
                continue;
            }
            tokio::time::sleep(self.work / 2).await;

            let outcome = if self.rng.random_bool(self.success_rate) {
                Outcome::success("listing submitted")
            } else {
                let detail = FAILURE_DETAILS[self.rng.random_range(0..FAILURE_DETAILS.len())];
                Outcome::failure(detail)
            };
            let disposition = self.orchestrator.complete(&job.id, outcome).await;
            tracing::debug!(worker_id = %self.id, job_id = %job.id, disposition = ?disposition, "Reported");

            tokio::time::sleep(self.pacing).await;
        }
        (self.id, processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::mock::MockProvider;
    use crate::runner::targets::synthetic_targets;

    fn fast_config(success_rate: f64) -> GlobalConfig {
        let mut config = GlobalConfig::default();
        config.simulate.workers = 3;
        config.simulate.success_rate = success_rate;
        config.simulate.work_ms = 2;
        config.simulate.pacing_ms = 1;
        config.simulate.retry_delay_ms = 5;
        config
    }

    #[tokio::test]
    async fn test_all_succeed() {
        let sim = Simulation::new(fast_config(1.0)).unwrap();
        let report = sim.run(&synthetic_targets(8)).await.unwrap();
        assert_eq!(report.submitted, 8);
        assert_eq!(report.completed, 8);
        assert_eq!(report.exhausted, 0);
        assert_eq!(report.per_worker.values().sum::<usize>(), 8);
        assert_eq!(report.metrics.total_completed, 8);
    }

    #[tokio::test]
    async fn test_all_fail_exhaust_after_retries() {
        let mut config = fast_config(0.0);
        config.retry.max_attempts = 2;
        let providers = Providers::all(Arc::new(MockProvider::healthy()));
        let sim = Simulation::with_providers(config, providers).unwrap();
        let report = sim.run(&synthetic_targets(3)).await.unwrap();

        assert_eq!(report.exhausted, 3);
        // One first run plus two retries per job
        assert_eq!(report.per_worker.values().sum::<usize>(), 9);
        assert_eq!(report.metrics.total_retried, 6);
    }

    #[tokio::test]
    async fn test_invalid_url_counted_as_rejected() {
        let sim = Simulation::new(fast_config(1.0)).unwrap();
        let mut entries = synthetic_targets(2);
        entries[1].submission_url = Some("not a url".into());
        let report = sim.run(&entries).await.unwrap();
        assert_eq!(report.submitted, 1);
        assert_eq!(report.rejected, 1);
    }
}
