//! Event-driven counters with a read-only snapshot.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::metrics::events::{CallResult, EngineEvent, EventSink};
use crate::resilience::BreakerState;

/// Health of one advisory provider as seen through its breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderHealth {
    pub state: BreakerState,
    pub successes: u64,
    pub failures: u64,
    /// Calls refused by an open breaker
    pub rejections: u64,
    /// Breaker transitions into Open
    pub trips: u64,
}

impl Default for ProviderHealth {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            successes: 0,
            failures: 0,
            rejections: 0,
            trips: 0,
        }
    }
}

impl ProviderHealth {
    /// Calls answered by the fallback value (failed or refused)
    pub fn fallbacks(&self) -> u64 {
        self.failures + self.rejections
    }
}

/// Point-in-time view of the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub total_submitted: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub total_retried: u64,
    pub total_exhausted: u64,
    pub total_cancelled: u64,
    pub per_provider: BTreeMap<String, ProviderHealth>,
    pub queue_depth: usize,
    pub delayed_depth: usize,
    pub by_tier: BTreeMap<u8, u64>,
    /// experiment id -> variant -> jobs assigned
    pub experiment_counts: BTreeMap<String, BTreeMap<String, u64>>,
}

/// Aggregates engine events into counters.
///
/// Only ever written through `EventSink::emit`, so reading a snapshot cannot
/// affect the orchestrator.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    inner: Mutex<MetricsSnapshot>,
}

impl MetricsAggregator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn apply(snapshot: &mut MetricsSnapshot, event: EngineEvent) {
        match event {
            EngineEvent::JobSubmitted {
                priority_tier,
                experiments,
                ..
            } => {
                snapshot.total_submitted += 1;
                *snapshot.by_tier.entry(priority_tier).or_insert(0) += 1;
                for (experiment, variant) in experiments {
                    *snapshot
                        .experiment_counts
                        .entry(experiment)
                        .or_default()
                        .entry(variant)
                        .or_insert(0) += 1;
                }
            }
            EngineEvent::JobCompleted { .. } => snapshot.total_completed += 1,
            EngineEvent::JobFailed { .. } => snapshot.total_failed += 1,
            EngineEvent::JobRetried { .. } => snapshot.total_retried += 1,
            EngineEvent::JobExhausted { .. } => snapshot.total_exhausted += 1,
            EngineEvent::JobCancelled { .. } => snapshot.total_cancelled += 1,
            EngineEvent::QueueDepthChanged { ready, delayed } => {
                snapshot.queue_depth = ready;
                snapshot.delayed_depth = delayed;
            }
            EngineEvent::BreakerRegistered { provider, state } => {
                snapshot.per_provider.entry(provider).or_default().state = state;
            }
            EngineEvent::BreakerStateChanged { provider, to, .. } => {
                let health = snapshot.per_provider.entry(provider).or_default();
                health.state = to;
                if to == BreakerState::Open {
                    health.trips += 1;
                }
            }
            EngineEvent::ProviderCall { provider, result } => {
                let health = snapshot.per_provider.entry(provider).or_default();
                match result {
                    CallResult::Success => health.successes += 1,
                    CallResult::Failure => health.failures += 1,
                    CallResult::Rejected => health.rejections += 1,
                }
            }
        }
    }
}

impl EventSink for MetricsAggregator {
    fn emit(&self, event: EngineEvent) {
        let mut snapshot = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Self::apply(&mut snapshot, event);
    }
}
