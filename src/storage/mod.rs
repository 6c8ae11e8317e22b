//! Persistence collaborator for jobs and breaker state.
//!
//! The orchestrator writes every job transition and breaker snapshot through a
//! `JobRepository`. Failures here are logged by the caller and never fail a
//! submit or an outcome report.

mod jsonl;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{StorageBackend, StorageConfig};
use crate::domain::SubmissionJob;
use crate::error::Result;
use crate::resilience::BreakerSnapshot;

pub use jsonl::JsonlRepository;
pub use memory::InMemoryRepository;

/// Records keyed by a stable identifier.
pub trait HasId {
    fn id(&self) -> &str;
}

impl HasId for SubmissionJob {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for BreakerSnapshot {
    fn id(&self) -> &str {
        &self.service_name
    }
}

/// Durable store for jobs and breakers.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert or replace a job by id.
    async fn upsert_job(&self, job: &SubmissionJob) -> Result<()>;

    async fn get_job(&self, id: &str) -> Result<Option<SubmissionJob>>;

    /// Every job whose status is not terminal.
    async fn list_active_jobs(&self) -> Result<Vec<SubmissionJob>>;

    /// Insert or replace a breaker snapshot by service name.
    async fn upsert_breaker(&self, snapshot: &BreakerSnapshot) -> Result<()>;

    async fn list_breakers(&self) -> Result<Vec<BreakerSnapshot>>;
}

/// Open the repository selected by the storage section.
pub fn open_repository(config: &StorageConfig) -> Result<Arc<dyn JobRepository>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryRepository::new())),
        StorageBackend::Jsonl => {
            tracing::debug!(dir = %config.jsonl_dir.display(), "Opening JSONL repository");
            Ok(Arc::new(JsonlRepository::open(&config.jsonl_dir)?))
        }
    }
}
