//! The orchestration engine.
//!
//! `Orchestrator` owns the job index, the dispatch leases, the priority queue and
//! the breaker registry. Lock order is always engine state, then queue, then the
//! event sink; nothing locks in the other direction.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::GlobalConfig;
use crate::domain::{
    CancelResult, Capability, Disposition, ExperimentAssignments, FailureCategory, FailureClassification,
    FailureContext, HeartbeatAck, JobStatus, ModelType, Outcome, Prediction, SubmissionJob, SubmissionRequest,
};
use crate::error::{AdmissionError, ProtocolError, ProviderError, Result};
use crate::metrics::{EngineEvent, EventSink, MetricsAggregator, MetricsSnapshot};
use crate::orchestrator::lease::LeaseLedger;
use crate::orchestrator::retired::RetiredJobs;
use crate::providers::{Fallbacks, Providers};
use crate::resilience::{BreakerSnapshot, CircuitBreakerRegistry, Guarded, execute_guarded};
use crate::scheduler::{PriorityQueue, QueueStats, RetryScheduler};
use crate::storage::JobRepository;

#[derive(Debug, Default)]
struct EngineState {
    /// Live jobs. Terminal jobs are dropped once persisted.
    jobs: HashMap<String, SubmissionJob>,
    leases: LeaseLedger,
    retired: RetiredJobs,
}

impl EngineState {
    /// Why a job missing from the index cannot be acted on
    fn missing(&self, job_id: &str) -> ProtocolError {
        match self.retired.status(job_id) {
            Some(status) => terminal_error(job_id, status),
            None => ProtocolError::UnknownJob(job_id.to_string()),
        }
    }
}

/// What `Orchestrator::recover` brought back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Non-terminal jobs put back in the queue
    pub jobs_restored: usize,
    /// Of those, jobs that were with a worker or mid-analysis when the process stopped
    pub requeued: usize,
    pub breakers_restored: usize,
}

/// Parts assembled by `OrchestratorBuilder`
pub(crate) struct EngineParts {
    pub config: GlobalConfig,
    pub providers: Providers,
    pub registry: CircuitBreakerRegistry,
    pub queue: Arc<PriorityQueue>,
    pub repository: Arc<dyn JobRepository>,
    pub events: Arc<dyn EventSink>,
    pub metrics: Arc<MetricsAggregator>,
}

/// Admission, dispatch and outcome handling for submission jobs.
pub struct Orchestrator {
    config: GlobalConfig,
    providers: Providers,
    fallbacks: Fallbacks,
    registry: CircuitBreakerRegistry,
    queue: Arc<PriorityQueue>,
    retry: RetryScheduler,
    repository: Arc<dyn JobRepository>,
    events: Arc<dyn EventSink>,
    metrics: Arc<MetricsAggregator>,
    state: Mutex<EngineState>,
    persisted_breakers: Mutex<HashMap<String, BreakerSnapshot>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("queue", &self.queue.peek_stats())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Apply a transition already known to be legal, logging if it is not.
fn advance(job: &mut SubmissionJob, next: JobStatus) -> bool {
    match job.transition(next) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(job_id = %job.id, error = %e, "Transition refused");
            false
        }
    }
}

/// When a retry becomes due. Saturates instead of overflowing the calendar.
fn retry_at(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(delay)
        .ok()
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn terminal_error(job_id: &str, status: JobStatus) -> ProtocolError {
    match status {
        JobStatus::Cancelled => ProtocolError::Cancelled(job_id.to_string()),
        status if status.is_terminal() => ProtocolError::AlreadyTerminal {
            job_id: job_id.to_string(),
            status: status.to_string(),
        },
        _ => ProtocolError::NotDispatched(job_id.to_string()),
    }
}

impl Orchestrator {
    pub(crate) fn from_parts(parts: EngineParts) -> Self {
        let retry = RetryScheduler::new(parts.config.retry_policy());
        let fallbacks = parts.config.fallbacks();
        let retired_capacity = parts.config.queue.retired_capacity;
        Self {
            config: parts.config,
            providers: parts.providers,
            fallbacks,
            registry: parts.registry,
            queue: parts.queue,
            retry,
            repository: parts.repository,
            events: parts.events,
            metrics: parts.metrics,
            state: Mutex::new(EngineState {
                retired: RetiredJobs::new(retired_capacity),
                ..Default::default()
            }),
            persisted_breakers: Mutex::new(HashMap::new()),
        }
    }

    //=== Admission ===

    /// Admit a request: enrich it through every advisory provider and queue it.
    ///
    /// Only a malformed request is an error. Provider failures, timeouts and open
    /// breakers all resolve to fallback values.
    pub async fn submit(&self, request: SubmissionRequest) -> std::result::Result<SubmissionJob, AdmissionError> {
        let SubmissionRequest {
            target,
            priority_tier,
            requirements,
        } = request;

        if let Err(e) = target.validate() {
            tracing::warn!(directory = %target.directory_id, error = %e, "Submission rejected");
            return Err(e);
        }

        let mut job = SubmissionJob::new(target, priority_tier, self.retry.policy().max_attempts);
        let deadline = Instant::now() + self.config.submit_deadline();

        let providers = &self.providers;
        let pending = &job;
        let requirements = &requirements;
        let (score, timing, content, experiments) = tokio::join!(
            self.guarded(Capability::SuccessScorer, deadline, self.fallbacks.score(), || async move {
                let score = providers.scorer.score(&pending.target).await?;
                score.validate()?;
                Ok(score)
            }),
            self.guarded(Capability::TimingAdvisor, deadline, None, || async move {
                let advice = providers
                    .timing
                    .recommend(&pending.target.directory_id, pending.priority_tier)
                    .await?;
                advice.validate()?;
                Ok(Some(advice))
            }),
            self.guarded(Capability::TextCustomizer, deadline, None, || async move {
                let content = providers.text.customize(&pending.target, requirements).await?;
                content.validate(requirements)?;
                Ok(Some(content))
            }),
            self.guarded(
                Capability::ExperimentAssigner,
                deadline,
                ExperimentAssignments::default(),
                || async move {
                    let assignments = providers.experiments.assign(pending).await?;
                    assignments.validate()?;
                    Ok(assignments)
                }
            ),
        );

        let substituted = [
            (Capability::SuccessScorer, score.is_fallback()),
            (Capability::TimingAdvisor, timing.is_fallback()),
            (Capability::TextCustomizer, content.is_fallback()),
            (Capability::ExperimentAssigner, experiments.is_fallback()),
        ];
        job.fallbacks = substituted
            .into_iter()
            .filter(|(_, fallback)| *fallback)
            .map(|(cap, _)| cap)
            .collect();

        let now = Utc::now();
        job.success_probability = score.value.probability;
        job.score_confidence = score.value.confidence;
        job.optimal_window = timing.value.and_then(|advice| advice.best_window(now));
        job.content_variant = content.value;
        job.experiment_assignments = experiments.value.assignments;
        if self.config.queue.respect_timing_windows
            && let Some(window) = job.optimal_window
            && window.start > now
        {
            job.scheduled_at = window.start;
        }

        self.persist(&job).await;
        {
            let mut state = lock(&self.state);
            state.jobs.insert(job.id.clone(), job.clone());
            self.queue.push(job.clone());
        }

        self.events.emit(EngineEvent::JobSubmitted {
            job_id: job.id.clone(),
            priority_tier: job.priority_tier,
            experiments: job.experiment_assignments.clone(),
        });
        tracing::info!(
            job_id = %job.id,
            directory = %job.target.directory_id,
            tier = job.priority_tier,
            probability = job.success_probability,
            fallbacks = job.fallbacks.len(),
            "Job submitted"
        );
        self.persist_breakers().await;
        Ok(job)
    }

    async fn guarded<T, F, Fut>(&self, capability: Capability, deadline: Instant, fallback: T, call: F) -> Guarded<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        let breaker = self.registry.get(capability);
        let timeout = self.config.provider_timeout(capability);
        execute_guarded(breaker, timeout, deadline, fallback, call).await
    }

    //=== Worker protocol ===

    /// Hand the best eligible job to `worker_id`. Never blocks.
    pub async fn dequeue(&self, worker_id: &str) -> Option<SubmissionJob> {
        let job = self.claim_next(worker_id, Utc::now())?;
        self.persist(&job).await;
        Some(job)
    }

    /// Like `dequeue`, but waits up to `max_wait` for a job to become eligible.
    pub async fn dequeue_wait(&self, worker_id: &str, max_wait: Duration) -> Option<SubmissionJob> {
        let deadline = Instant::now() + max_wait;
        loop {
            if let Some(job) = self.dequeue(worker_id).await {
                return Some(job);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            self.queue.wait_for_work(remaining).await;
        }
    }

    fn claim_next(&self, worker_id: &str, now: DateTime<Utc>) -> Option<SubmissionJob> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        while let Some(queued) = self.queue.dequeue_at(worker_id, now) {
            let Some(job) = state.jobs.get_mut(&queued.id) else {
                tracing::warn!(job_id = %queued.id, "Dequeued job missing from index, dropping");
                continue;
            };
            if !advance(job, JobStatus::Dispatched) {
                continue;
            }
            state.leases.grant(&job.id, worker_id, now);
            tracing::info!(job_id = %job.id, worker_id, attempt = job.attempt_count, "Job dispatched");
            return Some(job.clone());
        }
        None
    }

    /// Refresh a worker's lease on a dispatched job.
    pub fn heartbeat(&self, worker_id: &str, job_id: &str, progress: f64) -> HeartbeatAck {
        let ack = self.apply_heartbeat(worker_id, job_id, progress, Utc::now());
        if let HeartbeatAck::Ignored(e) = &ack {
            tracing::warn!(worker_id, job_id, error = %e, "Heartbeat ignored");
        }
        ack
    }

    fn apply_heartbeat(&self, worker_id: &str, job_id: &str, progress: f64, now: DateTime<Utc>) -> HeartbeatAck {
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        let status = match state.jobs.get(job_id) {
            Some(job) => job.status,
            None => match state.retired.status(job_id) {
                Some(status) => status,
                None => return HeartbeatAck::Ignored(ProtocolError::UnknownJob(job_id.to_string())),
            },
        };
        match status {
            JobStatus::Dispatched => {}
            JobStatus::Cancelled => return HeartbeatAck::Cancel,
            status => return HeartbeatAck::Ignored(terminal_error(job_id, status)),
        }
        let Some(lease) = state.leases.get_mut(job_id) else {
            return HeartbeatAck::Ignored(ProtocolError::NotDispatched(job_id.to_string()));
        };
        if lease.worker_id != worker_id {
            return HeartbeatAck::Ignored(ProtocolError::WorkerMismatch {
                job_id: job_id.to_string(),
                holder: lease.worker_id.clone(),
                worker_id: worker_id.to_string(),
            });
        }
        lease.touch(now, progress);
        HeartbeatAck::Continue
    }

    /// Alias of `report_outcome`, the name workers use.
    pub async fn complete(&self, job_id: &str, outcome: Outcome) -> Disposition {
        self.report_outcome(job_id, outcome).await
    }

    /// Record a worker's outcome for a dispatched job.
    ///
    /// Success completes the job. Failure is classified and either requeued with
    /// backoff or exhausted. Reports for unknown, cancelled or terminal jobs are
    /// ignored and nothing changes.
    pub async fn report_outcome(&self, job_id: &str, outcome: Outcome) -> Disposition {
        let job = match self.settle_dispatch(job_id, &outcome) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(job_id, error = %e, "Outcome ignored");
                return Disposition::Ignored(e);
            }
        };
        self.persist(&job).await;
        self.send_feedback(&job, &outcome);

        if outcome.success {
            self.retire(&job);
            self.events.emit(EngineEvent::JobCompleted { job_id: job.id.clone() });
            tracing::info!(job_id = %job.id, attempt = job.attempt_count, "Job completed");
            return Disposition::Completed;
        }
        self.handle_failure(job, outcome.details, None).await
    }

    fn settle_dispatch(&self, job_id: &str, outcome: &Outcome) -> std::result::Result<SubmissionJob, ProtocolError> {
        let mut guard = lock(&self.state);
        let state = &mut *guard;

        let Some(job) = state.jobs.get_mut(job_id) else {
            return Err(state.missing(job_id));
        };
        if job.status != JobStatus::Dispatched {
            return Err(terminal_error(job_id, job.status));
        }

        state.leases.release(job_id);
        let next = if outcome.success {
            JobStatus::Completed
        } else {
            job.last_error = Some(outcome.details.clone());
            JobStatus::Failed
        };
        advance(job, next);
        Ok(job.clone())
    }

    /// Classify a Failed job and requeue or exhaust it.
    ///
    /// `preset` skips the analyzer when the engine already knows the cause.
    async fn handle_failure(
        &self,
        job: SubmissionJob,
        details: String,
        preset: Option<FailureClassification>,
    ) -> Disposition {
        let classification = match preset {
            Some(classification) => classification,
            None => self.classify(&job, details).await,
        };
        self.events.emit(EngineEvent::JobFailed {
            job_id: job.id.clone(),
            category: classification.category,
        });

        let decision = self.retry.decide(&job, &classification);
        let now = Utc::now();

        let (disposition, updated) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            // Cancelled while the analyzer was running
            let Some(current) = state.jobs.get_mut(&job.id) else {
                return Disposition::Ignored(state.missing(&job.id));
            };
            if current.status != JobStatus::Failed {
                return Disposition::Ignored(terminal_error(&job.id, current.status));
            }
            current.last_failure = Some(classification);

            if decision.retry {
                current.attempt_count += 1;
                current.scheduled_at = retry_at(now, decision.delay);
                advance(current, JobStatus::Queued);
                self.queue.push_at(current.clone(), now);
                (
                    Disposition::Requeued {
                        attempt: current.attempt_count,
                        delay: decision.delay,
                        classification,
                    },
                    current.clone(),
                )
            } else {
                advance(current, JobStatus::Exhausted);
                (Disposition::Exhausted { classification }, current.clone())
            }
        };

        match &disposition {
            Disposition::Requeued { attempt, delay, .. } => {
                self.events.emit(EngineEvent::JobRetried {
                    job_id: updated.id.clone(),
                    attempt: *attempt,
                });
                tracing::info!(
                    job_id = %updated.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    category = ?classification.category,
                    "Job requeued"
                );
            }
            _ => {
                self.events.emit(EngineEvent::JobExhausted {
                    job_id: updated.id.clone(),
                });
                tracing::warn!(
                    job_id = %updated.id,
                    attempts = updated.attempt_count,
                    category = ?classification.category,
                    fixable = classification.is_fixable,
                    "Job exhausted"
                );
            }
        }
        self.persist(&updated).await;
        self.retire(&updated);
        disposition
    }

    async fn classify(&self, job: &SubmissionJob, details: String) -> FailureClassification {
        let context = FailureContext {
            job_id: job.id.clone(),
            target: job.target.clone(),
            attempt_count: job.attempt_count,
            details,
        };
        let analyzer = &self.providers.analyzer;
        let context = &context;
        let deadline = Instant::now() + self.config.provider_timeout(Capability::FailureAnalyzer);
        self.guarded(
            Capability::FailureAnalyzer,
            deadline,
            self.fallbacks.classification(),
            || async move {
                let classification = analyzer.classify(context).await?;
                classification.validate()?;
                Ok(classification)
            },
        )
        .await
        .into_value()
    }

    /// Grade the job's predictions against its outcome, off the caller's path.
    fn send_feedback(&self, job: &SubmissionJob, outcome: &Outcome) {
        let prediction = Prediction {
            job_id: job.id.clone(),
            success_probability: job.success_probability,
            experiment_assignments: job.experiment_assignments.clone(),
            from_fallback: job.fallbacks.contains(&Capability::SuccessScorer),
        };
        let mut models = vec![ModelType::SuccessScorer];
        if job.optimal_window.is_some() {
            models.push(ModelType::TimingAdvisor);
        }
        if job.content_variant.is_some() {
            models.push(ModelType::TextCustomizer);
        }

        let breaker = self.registry.get(Capability::FeedbackSink).clone();
        let sink = self.providers.feedback.clone();
        let timeout = self.config.provider_timeout(Capability::FeedbackSink);
        let outcome = outcome.clone();

        tokio::spawn(async move {
            for model in models {
                let deadline = Instant::now() + timeout;
                let result =
                    execute_guarded(&breaker, timeout, deadline, (), || sink.record(model, &prediction, &outcome)).await;
                if let Some(reason) = result.fallback_reason {
                    tracing::debug!(job_id = %prediction.job_id, model = ?model, error = %reason, "Feedback not recorded");
                }
            }
        });
    }

    //=== Operator surface ===

    /// Cancel a job. Queued jobs leave the queue; dispatched ones are cancelled
    /// advisorily and their worker learns of it on the next heartbeat.
    pub async fn cancel(&self, job_id: &str) -> CancelResult {
        let (result, job) = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let Some(job) = state.jobs.get_mut(job_id) else {
                if state.retired.contains(job_id) {
                    return CancelResult::AlreadyTerminal;
                }
                return CancelResult::NotFound;
            };
            let result = match job.status {
                JobStatus::Queued => {
                    self.queue.remove(job_id);
                    CancelResult::Removed
                }
                JobStatus::Dispatched | JobStatus::Failed => {
                    state.leases.release(job_id);
                    CancelResult::Advisory
                }
                _ => return CancelResult::AlreadyTerminal,
            };
            advance(job, JobStatus::Cancelled);
            (result, job.clone())
        };

        self.events.emit(EngineEvent::JobCancelled { job_id: job.id.clone() });
        tracing::info!(job_id = %job.id, result = ?result, "Job cancelled");
        self.persist(&job).await;
        self.retire(&job);
        result
    }

    /// Reload breakers and non-terminal jobs from the repository.
    ///
    /// Jobs that were dispatched or mid-analysis go back to Queued since their
    /// workers are gone. Jobs already known to this engine are skipped.
    pub async fn recover(&self) -> Result<RecoveryReport> {
        let snapshots = self.repository.list_breakers().await?;
        let breakers_restored = self.registry.restore(&snapshots);
        {
            let mut persisted = lock(&self.persisted_breakers);
            for snapshot in snapshots {
                persisted.insert(snapshot.service_name.clone(), snapshot);
            }
        }

        let active = self.repository.list_active_jobs().await?;
        let mut report = RecoveryReport {
            breakers_restored,
            ..Default::default()
        };
        let mut changed = Vec::new();
        {
            let mut state = lock(&self.state);
            for mut job in active {
                if state.jobs.contains_key(&job.id) || state.retired.contains(&job.id) {
                    continue;
                }
                match job.status {
                    JobStatus::Queued => {}
                    JobStatus::Dispatched | JobStatus::Failed => {
                        if !advance(&mut job, JobStatus::Queued) {
                            continue;
                        }
                        report.requeued += 1;
                        changed.push(job.clone());
                    }
                    _ => continue,
                }
                self.queue.push(job.clone());
                state.jobs.insert(job.id.clone(), job);
                report.jobs_restored += 1;
            }
        }

        for job in &changed {
            self.persist(job).await;
        }
        tracing::info!(
            jobs = report.jobs_restored,
            requeued = report.requeued,
            breakers = report.breakers_restored,
            "Recovered from repository"
        );
        Ok(report)
    }

    /// Fail every dispatch whose worker has not sent a heartbeat within the
    /// lease timeout. Returns how many were reclaimed.
    pub async fn reclaim_expired_leases(&self, now: DateTime<Utc>) -> usize {
        let timeout = self.config.lease_timeout();
        let reclaimed: Vec<SubmissionJob> = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let mut reclaimed = Vec::new();
            for job_id in state.leases.expired(now, timeout) {
                let Some(lease) = state.leases.release(&job_id) else { continue };
                let Some(job) = state.jobs.get_mut(&job_id) else { continue };
                if job.status != JobStatus::Dispatched {
                    continue;
                }
                job.last_error = Some(format!("lease expired: no heartbeat from {}", lease.worker_id));
                if advance(job, JobStatus::Failed) {
                    tracing::warn!(job_id = %job_id, worker_id = %lease.worker_id, "Lease expired, reclaiming job");
                    reclaimed.push(job.clone());
                }
            }
            reclaimed
        };

        let count = reclaimed.len();
        for job in reclaimed {
            self.persist(&job).await;
            let details = job.last_error.clone().unwrap_or_default();
            let lost = FailureClassification {
                category: FailureCategory::WorkerLost,
                is_fixable: true,
                confidence: 1.0,
            };
            self.handle_failure(job, details, Some(lost)).await;
        }
        count
    }

    //=== Persistence ===

    async fn persist(&self, job: &SubmissionJob) {
        if let Err(e) = self.repository.upsert_job(job).await {
            tracing::error!(job_id = %job.id, status = %job.status, error = %e, "Failed to persist job");
        }
    }

    /// Drop a persisted terminal job from the index, keeping its final status.
    fn retire(&self, job: &SubmissionJob) {
        if !job.status.is_terminal() {
            return;
        }
        let mut state = lock(&self.state);
        let status = state.jobs.get(&job.id).map(|j| j.status).filter(|s| s.is_terminal());
        if let Some(status) = status {
            state.jobs.remove(&job.id);
            state.retired.record(&job.id, status);
        }
    }

    /// Write breaker snapshots that changed since the last write.
    pub async fn persist_breakers(&self) {
        let changed: Vec<BreakerSnapshot> = {
            let persisted = lock(&self.persisted_breakers);
            self.registry
                .snapshots()
                .into_iter()
                .filter(|s| persisted.get(&s.service_name) != Some(s))
                .collect()
        };
        for snapshot in changed {
            match self.repository.upsert_breaker(&snapshot).await {
                Ok(()) => {
                    lock(&self.persisted_breakers).insert(snapshot.service_name.clone(), snapshot);
                }
                Err(e) => {
                    tracing::error!(provider = %snapshot.service_name, error = %e, "Failed to persist breaker");
                }
            }
        }
    }

    //=== Queries ===

    /// A job that has not finished yet. Finished jobs live in the repository.
    pub fn job(&self, job_id: &str) -> Option<SubmissionJob> {
        lock(&self.state).jobs.get(job_id).cloned()
    }

    /// Current status of a live or recently finished job
    pub fn job_status(&self, job_id: &str) -> Option<JobStatus> {
        let state = lock(&self.state);
        match state.jobs.get(job_id) {
            Some(job) => Some(job.status),
            None => state.retired.status(job_id),
        }
    }

    /// Jobs held in the live index
    pub fn tracked_jobs(&self) -> usize {
        lock(&self.state).jobs.len()
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.peek_stats()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn breakers(&self) -> &CircuitBreakerRegistry {
        &self.registry
    }

    pub fn queue(&self) -> &PriorityQueue {
        &self.queue
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    /// Ids of every job not yet terminal, oldest first
    pub fn active_job_ids(&self) -> Vec<String> {
        let state = lock(&self.state);
        let mut active: Vec<&SubmissionJob> = state.jobs.values().filter(|j| !j.status.is_terminal()).collect();
        active.sort_by_key(|j| j.created_at);
        active.into_iter().map(|j| j.id.clone()).collect()
    }

    /// Jobs currently held by a worker
    pub fn active_leases(&self) -> usize {
        lock(&self.state).leases.len()
    }
}
