//! Orchestrator integration tests
//!
//! Exercise admission, dispatch, outcome handling and cancellation through the
//! public API with mock providers.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use submitr::config::GlobalConfig;
use submitr::domain::{
    CancelResult, Capability, Disposition, FailureCategory, FailureClassification, HeartbeatAck, JobStatus,
    ModelType, Outcome, SubmissionRequest, SubmissionTarget,
};
use submitr::error::ProtocolError;
use submitr::providers::Providers;
use submitr::providers::mock::{MockBehavior, MockProvider};
use submitr::resilience::BreakerState;
use submitr::{Orchestrator, OrchestratorBuilder};

fn test_config() -> GlobalConfig {
    let mut config = GlobalConfig::default();
    config.providers.default_timeout_ms = 50;
    config.providers.submit_deadline_ms = 200;
    config.queue.respect_timing_windows = false;
    config
}

fn engine_with(config: GlobalConfig, providers: Providers) -> Orchestrator {
    OrchestratorBuilder::new(config).providers(providers).build().unwrap()
}

fn healthy_engine() -> (Orchestrator, Arc<MockProvider>) {
    let mock = Arc::new(MockProvider::healthy());
    (engine_with(test_config(), Providers::all(mock.clone())), mock)
}

fn request(directory: &str, tier: u8) -> SubmissionRequest {
    let target = SubmissionTarget::new(
        directory,
        format!("https://{}.example.com/add", directory),
        "biz-1",
        "Acme Plumbing",
    );
    SubmissionRequest::new(target, tier)
}

#[tokio::test]
async fn test_submit_enriches_job_from_providers() {
    let (engine, _mock) = healthy_engine();
    let job = engine.submit(request("yelp", 2)).await.unwrap();

    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.success_probability, 0.8);
    assert!(job.optimal_window.is_some());
    assert!(job.content_variant.is_some());
    assert_eq!(job.experiment_assignments["description_style"], "concise");
    assert!(job.fallbacks.is_empty());
    assert_eq!(engine.queue_stats().depth, 1);
}

#[tokio::test]
async fn test_submit_succeeds_with_all_providers_down() {
    let engine = engine_with(test_config(), Providers::all(Arc::new(MockProvider::failing())));
    let job = engine.submit(request("yelp", 2)).await.unwrap();

    assert_eq!(job.success_probability, 0.5);
    assert_eq!(job.score_confidence, 0.0);
    assert!(job.optimal_window.is_none());
    assert!(job.content_variant.is_none());
    assert!(job.experiment_assignments.is_empty());
    assert_eq!(job.fallbacks.len(), 4);
    assert_eq!(engine.queue_stats().depth, 1);
}

#[tokio::test]
async fn test_submit_bounded_when_providers_hang() {
    let engine = engine_with(test_config(), Providers::all(Arc::new(MockProvider::hanging())));
    let started = std::time::Instant::now();
    let job = engine.submit(request("yelp", 2)).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(job.fallbacks.len(), 4);
}

#[tokio::test]
async fn test_malformed_responses_use_fallbacks() {
    let engine = engine_with(
        test_config(),
        Providers::all(Arc::new(MockProvider::new(MockBehavior::Malformed))),
    );
    let job = engine.submit(request("yelp", 2)).await.unwrap();
    assert_eq!(job.success_probability, 0.5);
    assert!(job.fallbacks.contains(&Capability::SuccessScorer));
    assert!(job.fallbacks.contains(&Capability::TimingAdvisor));
}

#[tokio::test]
async fn test_admission_rejects_bad_request_without_queueing() {
    let (engine, mock) = healthy_engine();
    let target = SubmissionTarget::new("yelp", "not a url", "biz-1", "Acme");
    assert!(engine.submit(SubmissionRequest::new(target, 1)).await.is_err());

    let target = SubmissionTarget::new("yelp", "https://yelp.com", "", "Acme");
    assert!(engine.submit(SubmissionRequest::new(target, 1)).await.is_err());

    assert_eq!(engine.queue_stats().depth, 0);
    assert_eq!(mock.calls(), 0);
}

#[tokio::test]
async fn test_open_scorer_breaker_skips_provider() {
    let mut config = test_config();
    config.breaker.failure_threshold = 3;
    let scorer = Arc::new(MockProvider::failing());
    let mut providers = Providers::all(Arc::new(MockProvider::healthy()));
    providers.scorer = scorer.clone();
    let engine = engine_with(config, providers);

    for i in 0..3 {
        engine.submit(request(&format!("dir{}", i), 1)).await.unwrap();
    }
    assert_eq!(scorer.calls(), 3);
    assert_eq!(engine.breakers().get(Capability::SuccessScorer).state(), BreakerState::Open);

    let fourth = engine.submit(request("dir3", 1)).await.unwrap();
    assert_eq!(scorer.calls(), 3);
    assert_eq!(fourth.success_probability, 0.5);
    assert!(fourth.fallbacks.contains(&Capability::SuccessScorer));
    // Other capabilities are unaffected
    assert!(!fourth.fallbacks.contains(&Capability::TimingAdvisor));

    let health = &engine.metrics().per_provider["success_scorer"];
    assert_eq!(health.rejections, 1);
    assert_eq!(health.state, BreakerState::Open);
}

#[tokio::test]
async fn test_higher_tier_dequeues_first() {
    let (engine, mock) = healthy_engine();
    mock.set_score(0.9, 1.0);
    let a = engine.submit(request("a", 2)).await.unwrap();
    mock.set_score(0.1, 1.0);
    let b = engine.submit(request("b", 3)).await.unwrap();
    assert_eq!(b.success_probability, 0.1);

    assert_eq!(engine.dequeue("w1").await.unwrap().id, b.id);
    assert_eq!(engine.dequeue("w1").await.unwrap().id, a.id);
}

#[tokio::test]
async fn test_probability_breaks_tier_ties() {
    let (engine, mock) = healthy_engine();
    mock.set_score(0.2, 1.0);
    let low = engine.submit(request("low", 2)).await.unwrap();
    mock.set_score(0.7, 1.0);
    let high = engine.submit(request("high", 2)).await.unwrap();

    assert_eq!(engine.dequeue("w1").await.unwrap().id, high.id);
    assert_eq!(engine.dequeue("w1").await.unwrap().id, low.id);
}

#[tokio::test]
async fn test_equal_jobs_dequeue_oldest_first() {
    let (engine, _mock) = healthy_engine();
    let mut ids = Vec::new();
    for i in 0..5 {
        ids.push(engine.submit(request(&format!("dir{}", i), 1)).await.unwrap().id);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let mut order = Vec::new();
    while let Some(job) = engine.dequeue("w1").await {
        order.push(job.id);
    }
    assert_eq!(order, ids);
}

#[tokio::test]
async fn test_future_window_delays_dispatch() {
    let mut config = test_config();
    config.queue.respect_timing_windows = true;
    let mut providers = Providers::all(Arc::new(MockProvider::healthy()));
    providers.timing = Arc::new(submitr::providers::heuristic::StaggeredAdvisor {
        stagger: Duration::from_millis(150),
    });
    let engine = engine_with(config, providers);

    let job = engine.submit(request("yelp", 2)).await.unwrap();
    assert!(job.scheduled_at > Utc::now());
    assert_eq!(engine.queue_stats().delayed, 1);
    assert!(engine.dequeue("w1").await.is_none());

    let dispatched = engine.dequeue_wait("w1", Duration::from_secs(2)).await.unwrap();
    assert_eq!(dispatched.id, job.id);
    assert!(Utc::now() >= job.scheduled_at);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dequeue_hands_out_each_job_once() {
    let (engine, _mock) = healthy_engine();
    let engine = Arc::new(engine);
    for i in 0..50 {
        engine.submit(request(&format!("dir{}", i), (i % 4) as u8)).await.unwrap();
    }

    let handles: Vec<_> = (0..8)
        .map(|w| {
            let engine = engine.clone();
            tokio::spawn(async move {
                let mut got = Vec::new();
                while let Some(job) = engine.dequeue(&format!("w{}", w)).await {
                    got.push(job.id);
                }
                got
            })
        })
        .collect();

    let mut seen = HashSet::new();
    let mut total = 0;
    for handle in handles {
        for id in handle.await.unwrap() {
            assert!(seen.insert(id), "job dispatched twice");
            total += 1;
        }
    }
    assert_eq!(total, 50);
    assert_eq!(engine.active_leases(), 50);
}

#[tokio::test]
async fn test_success_completes_and_sends_feedback() {
    let (engine, mock) = healthy_engine();
    let job = engine.submit(request("yelp", 2)).await.unwrap();
    engine.dequeue("w1").await.unwrap();

    let disposition = engine.complete(&job.id, Outcome::success("listed")).await;
    assert_eq!(disposition, Disposition::Completed);
    assert_eq!(engine.job_status(&job.id), Some(JobStatus::Completed));
    assert_eq!(engine.active_leases(), 0);

    // Feedback runs on a detached task
    for _ in 0..50 {
        if mock.feedback_records().len() == 3 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let models: Vec<ModelType> = mock.feedback_records().iter().map(|(m, _, _)| *m).collect();
    assert_eq!(
        models,
        vec![ModelType::SuccessScorer, ModelType::TimingAdvisor, ModelType::TextCustomizer]
    );
    assert_eq!(engine.metrics().total_completed, 1);
}

#[tokio::test]
async fn test_failure_requeues_with_backoff_then_exhausts() {
    let mut config = test_config();
    config.retry.max_attempts = 1;
    config.retry.base_delay_ms = 10;
    let engine = engine_with(config, Providers::all(Arc::new(MockProvider::healthy())));

    let job = engine.submit(request("yelp", 2)).await.unwrap();
    engine.dequeue("w1").await.unwrap();
    let first = engine.complete(&job.id, Outcome::failure("timeout loading form")).await;
    match first {
        Disposition::Requeued {
            attempt,
            delay,
            classification,
        } => {
            assert_eq!(attempt, 1);
            assert_eq!(delay, Duration::from_millis(10));
            assert_eq!(classification.category, FailureCategory::Timeout);
        }
        other => panic!("expected requeue, got {:?}", other),
    }
    let stored = engine.job(&job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.attempt_count, 1);
    assert_eq!(stored.last_error.as_deref(), Some("timeout loading form"));

    engine.dequeue_wait("w1", Duration::from_secs(1)).await.unwrap();
    let second = engine.complete(&job.id, Outcome::failure("timeout again")).await;
    assert!(matches!(second, Disposition::Exhausted { .. }));
    assert_eq!(engine.job_status(&job.id), Some(JobStatus::Exhausted));

    let metrics = engine.metrics();
    assert_eq!(metrics.total_failed, 2);
    assert_eq!(metrics.total_retried, 1);
    assert_eq!(metrics.total_exhausted, 1);
}

#[tokio::test]
async fn test_unfixable_failure_exhausts_immediately() {
    let analyzer = MockProvider::healthy().with_classification(FailureClassification {
        category: FailureCategory::Duplicate,
        is_fixable: false,
        confidence: 0.9,
    });
    let mut providers = Providers::all(Arc::new(MockProvider::healthy()));
    providers.analyzer = Arc::new(analyzer);
    let engine = engine_with(test_config(), providers);

    let job = engine.submit(request("yelp", 2)).await.unwrap();
    engine.dequeue("w1").await.unwrap();
    let disposition = engine.complete(&job.id, Outcome::failure("already listed")).await;
    assert!(matches!(disposition, Disposition::Exhausted { classification } if classification.category == FailureCategory::Duplicate));
}

#[tokio::test]
async fn test_analyzer_down_uses_unknown_classification() {
    let mut providers = Providers::all(Arc::new(MockProvider::healthy()));
    providers.analyzer = Arc::new(MockProvider::failing());
    let engine = engine_with(test_config(), providers);

    let job = engine.submit(request("yelp", 2)).await.unwrap();
    engine.dequeue("w1").await.unwrap();
    match engine.complete(&job.id, Outcome::failure("???")).await {
        Disposition::Requeued { classification, .. } => {
            assert_eq!(classification, FailureClassification::unknown());
        }
        other => panic!("expected requeue, got {:?}", other),
    }
}

#[tokio::test]
async fn test_protocol_errors_are_ignored() {
    let (engine, _mock) = healthy_engine();
    let job = engine.submit(request("yelp", 2)).await.unwrap();

    // Not dispatched yet
    assert!(matches!(
        engine.complete(&job.id, Outcome::success("x")).await,
        Disposition::Ignored(ProtocolError::NotDispatched(_))
    ));
    assert!(matches!(
        engine.complete("job-missing", Outcome::success("x")).await,
        Disposition::Ignored(ProtocolError::UnknownJob(_))
    ));

    engine.dequeue("w1").await.unwrap();
    assert_eq!(engine.heartbeat("w1", &job.id, 0.3), HeartbeatAck::Continue);
    assert!(matches!(
        engine.heartbeat("w2", &job.id, 0.3),
        HeartbeatAck::Ignored(ProtocolError::WorkerMismatch { .. })
    ));

    engine.complete(&job.id, Outcome::success("listed")).await;
    assert!(matches!(
        engine.complete(&job.id, Outcome::success("again")).await,
        Disposition::Ignored(ProtocolError::AlreadyTerminal { .. })
    ));
    assert!(matches!(
        engine.heartbeat("w1", &job.id, 1.0),
        HeartbeatAck::Ignored(ProtocolError::AlreadyTerminal { .. })
    ));
}

#[tokio::test]
async fn test_cancel_queued_and_dispatched() {
    let (engine, _mock) = healthy_engine();
    let queued = engine.submit(request("a", 1)).await.unwrap();
    let running = engine.submit(request("b", 3)).await.unwrap();

    assert_eq!(engine.dequeue("w1").await.unwrap().id, running.id);
    assert_eq!(engine.cancel(&queued.id).await, CancelResult::Removed);
    assert_eq!(engine.queue_stats().depth, 0);

    assert_eq!(engine.cancel(&running.id).await, CancelResult::Advisory);
    assert_eq!(engine.heartbeat("w1", &running.id, 0.5), HeartbeatAck::Cancel);
    assert!(matches!(
        engine.complete(&running.id, Outcome::success("late")).await,
        Disposition::Ignored(ProtocolError::Cancelled(_))
    ));
    assert_eq!(engine.job_status(&running.id), Some(JobStatus::Cancelled));

    assert_eq!(engine.cancel(&running.id).await, CancelResult::AlreadyTerminal);
    assert_eq!(engine.cancel("job-missing").await, CancelResult::NotFound);
    assert_eq!(engine.metrics().total_cancelled, 2);
}

#[tokio::test]
async fn test_reclaim_expired_lease_requeues_as_worker_lost() {
    let (engine, _mock) = healthy_engine();
    let job = engine.submit(request("yelp", 2)).await.unwrap();
    engine.dequeue("w1").await.unwrap();

    let later = Utc::now() + chrono::Duration::minutes(10);
    assert_eq!(engine.reclaim_expired_leases(later).await, 1);

    let stored = engine.job(&job.id).unwrap();
    assert_eq!(stored.status, JobStatus::Queued);
    assert_eq!(stored.attempt_count, 1);
    assert_eq!(stored.last_failure.unwrap().category, FailureCategory::WorkerLost);
    // The old worker's report is refused
    assert!(matches!(
        engine.complete(&job.id, Outcome::success("late")).await,
        Disposition::Ignored(_)
    ));
}
