//! Volatile repository for tests and throwaway runs.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::JobRepository;
use crate::domain::SubmissionJob;
use crate::error::{Result, SubmitrError};
use crate::resilience::BreakerSnapshot;

#[derive(Debug, Default)]
pub struct InMemoryRepository {
    jobs: RwLock<HashMap<String, SubmissionJob>>,
    breakers: RwLock<HashMap<String, BreakerSnapshot>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs stored, terminal ones included
    pub fn job_count(&self) -> usize {
        self.jobs.read().map(|jobs| jobs.len()).unwrap_or_default()
    }
}

fn poisoned<E: std::fmt::Display>(e: E) -> SubmitrError {
    SubmitrError::Persistence(e.to_string())
}

#[async_trait]
impl JobRepository for InMemoryRepository {
    async fn upsert_job(&self, job: &SubmissionJob) -> Result<()> {
        self.jobs.write().map_err(poisoned)?.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<SubmissionJob>> {
        Ok(self.jobs.read().map_err(poisoned)?.get(id).cloned())
    }

    async fn list_active_jobs(&self) -> Result<Vec<SubmissionJob>> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut active: Vec<SubmissionJob> = jobs.values().filter(|j| !j.status.is_terminal()).cloned().collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(active)
    }

    async fn upsert_breaker(&self, snapshot: &BreakerSnapshot) -> Result<()> {
        self.breakers
            .write()
            .map_err(poisoned)?
            .insert(snapshot.service_name.clone(), snapshot.clone());
        Ok(())
    }

    async fn list_breakers(&self) -> Result<Vec<BreakerSnapshot>> {
        let mut all: Vec<BreakerSnapshot> = self.breakers.read().map_err(poisoned)?.values().cloned().collect();
        all.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobStatus, SubmissionTarget};
    use crate::resilience::BreakerState;

    fn job() -> SubmissionJob {
        SubmissionJob::new(SubmissionTarget::new("yelp", "yelp.com", "biz", "Biz"), 1, 3)
    }

    #[tokio::test]
    async fn test_upsert_replaces() {
        let repo = InMemoryRepository::new();
        let mut j = job();
        repo.upsert_job(&j).await.unwrap();
        j.status = JobStatus::Dispatched;
        repo.upsert_job(&j).await.unwrap();

        assert_eq!(repo.job_count(), 1);
        assert_eq!(repo.get_job(&j.id).await.unwrap().unwrap().status, JobStatus::Dispatched);
    }

    #[tokio::test]
    async fn test_list_active_excludes_terminal() {
        let repo = InMemoryRepository::new();
        let queued = job();
        let mut done = job();
        done.status = JobStatus::Completed;
        repo.upsert_job(&queued).await.unwrap();
        repo.upsert_job(&done).await.unwrap();

        let active = repo.list_active_jobs().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, queued.id);
    }

    #[tokio::test]
    async fn test_breakers_keyed_by_name() {
        let repo = InMemoryRepository::new();
        let mut snap = BreakerSnapshot {
            service_name: "success_scorer".into(),
            state: BreakerState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            failure_threshold: 5,
            reset_timeout_ms: 60_000,
        };
        repo.upsert_breaker(&snap).await.unwrap();
        snap.consecutive_failures = 2;
        repo.upsert_breaker(&snap).await.unwrap();

        let all = repo.list_breakers().await.unwrap();
        assert_eq!(all, vec![snap]);
    }
}
