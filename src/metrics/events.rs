//! Engine events and the sink they are emitted to.
//!
//! The breaker, the queue and the orchestrator report what happened through an
//! `EventSink`; they never read anything back from it.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use crate::domain::FailureCategory;
use crate::resilience::BreakerState;

/// How a guarded provider call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallResult {
    /// Provider answered with a valid response
    Success,
    /// Provider was called and failed (error, timeout, malformed)
    Failure,
    /// Breaker refused the call; fallback used without calling the provider
    Rejected,
}

/// Something observable happened inside the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    JobSubmitted {
        job_id: String,
        priority_tier: u8,
        experiments: BTreeMap<String, String>,
    },
    JobCompleted {
        job_id: String,
    },
    JobFailed {
        job_id: String,
        category: FailureCategory,
    },
    JobRetried {
        job_id: String,
        attempt: u32,
    },
    JobExhausted {
        job_id: String,
    },
    JobCancelled {
        job_id: String,
    },
    QueueDepthChanged {
        ready: usize,
        delayed: usize,
    },
    BreakerRegistered {
        provider: String,
        state: BreakerState,
    },
    BreakerStateChanged {
        provider: String,
        from: BreakerState,
        to: BreakerState,
    },
    ProviderCall {
        provider: String,
        result: CallResult,
    },
}

/// Receiver of engine events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: EngineEvent) {}
}

/// Keeps every event in memory, for tests and debugging
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: EngineEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}

/// Forwards every event to each inner sink, in order
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }
}

impl EventSink for FanoutSink {
    fn emit(&self, event: EngineEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone());
            }
            last.emit(event);
        }
    }
}
