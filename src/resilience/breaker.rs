//! Per-provider circuit breaker.
//!
//! ```text
//!    Closed ──(threshold consecutive failures)──► Open
//!      ▲                                           │ reset timeout elapsed,
//!      │ trial succeeds                            │ one caller admitted
//!      │                                           ▼
//!      └──────────────────────────────────────  HalfOpen ──(trial fails)──► Open
//! ```
//!
//! `allow()` hands out a `CallPermit` that must be settled with
//! `record_success`/`record_failure`. Every transition bumps an epoch; a permit
//! from an older epoch is stale and its outcome is ignored, so calls admitted
//! before a trip cannot re-trip or double count once they finish.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::{CallResult, EngineEvent, EventSink};

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    /// Calls flow, failures are counted
    Closed,
    /// Calls are refused until the reset timeout elapses
    Open,
    /// One trial call is in flight
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Thresholds for one breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures that trip the breaker
    pub failure_threshold: u32,
    /// Time spent Open before a trial call is allowed
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Persistable view of a breaker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerSnapshot {
    pub service_name: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

#[derive(Debug)]
struct BreakerCore {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    opened_at_wall: Option<DateTime<Utc>>,
    epoch: u64,
}

struct BreakerInner {
    name: String,
    config: BreakerConfig,
    core: Mutex<BreakerCore>,
    events: Arc<dyn EventSink>,
}

/// Failure-tracking state machine shared by every caller of one provider.
///
/// Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct CircuitBreaker {
    inner: Arc<BreakerInner>,
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Admission ticket for one guarded call.
#[must_use = "a permit must be settled with record_success or record_failure"]
pub struct CallPermit {
    breaker: CircuitBreaker,
    epoch: u64,
    trial: bool,
    settled: bool,
}

impl CallPermit {
    /// True for the single call admitted while HalfOpen
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    fn settle(mut self, success: bool) {
        self.settled = true;
        self.breaker.settle(self.epoch, self.trial, success);
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        // An abandoned trial must not leave the breaker stuck in HalfOpen
        if !self.settled && self.trial {
            self.breaker.settle(self.epoch, true, false);
        }
    }
}

impl std::fmt::Debug for CallPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallPermit")
            .field("breaker", &self.breaker.inner.name)
            .field("epoch", &self.epoch)
            .field("trial", &self.trial)
            .finish()
    }
}

impl CircuitBreaker {
    /// Create a closed breaker and announce it to the event sink.
    pub fn new(name: impl Into<String>, config: BreakerConfig, events: Arc<dyn EventSink>) -> Self {
        let name = name.into();
        events.emit(EngineEvent::BreakerRegistered {
            provider: name.clone(),
            state: BreakerState::Closed,
        });
        Self {
            inner: Arc::new(BreakerInner {
                name,
                config,
                core: Mutex::new(BreakerCore {
                    state: BreakerState::Closed,
                    consecutive_failures: 0,
                    opened_at: None,
                    opened_at_wall: None,
                    epoch: 0,
                }),
                events,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> BreakerConfig {
        self.inner.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        self.inner.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Ask to make a call now.
    ///
    /// Closed always admits. Open admits nothing until the reset timeout has
    /// elapsed, then moves to HalfOpen and admits exactly one trial. HalfOpen
    /// refuses everyone else until the trial settles.
    pub fn allow(&self) -> Option<CallPermit> {
        let mut core = self.lock();
        let (admitted, change) = match core.state {
            BreakerState::Closed => (Some(false), None),
            BreakerState::Open => {
                let elapsed = core.opened_at.map(|t| t.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.inner.config.reset_timeout {
                    let change = Self::transition(&mut core, BreakerState::HalfOpen);
                    (Some(true), Some(change))
                } else {
                    (None, None)
                }
            }
            BreakerState::HalfOpen => (None, None),
        };
        let epoch = core.epoch;
        if let Some((from, to)) = change {
            self.announce(from, to);
        }
        drop(core);

        admitted.map(|trial| CallPermit {
            breaker: self.clone(),
            epoch,
            trial,
            settled: false,
        })
    }

    /// Settle a permit as successful.
    pub fn record_success(&self, permit: CallPermit) {
        debug_assert!(Arc::ptr_eq(&self.inner, &permit.breaker.inner));
        permit.settle(true);
    }

    /// Settle a permit as failed.
    pub fn record_failure(&self, permit: CallPermit) {
        debug_assert!(Arc::ptr_eq(&self.inner, &permit.breaker.inner));
        permit.settle(false);
    }

    fn settle(&self, epoch: u64, trial: bool, success: bool) {
        let mut core = self.lock();
        if core.epoch != epoch {
            tracing::debug!(provider = %self.inner.name, "Ignoring outcome of stale breaker permit");
            return;
        }

        let change = match (core.state, success) {
            (BreakerState::Closed, true) => {
                core.consecutive_failures = 0;
                None
            }
            (BreakerState::Closed, false) => {
                core.consecutive_failures += 1;
                if core.consecutive_failures >= self.inner.config.failure_threshold {
                    Some(Self::open(&mut core))
                } else {
                    None
                }
            }
            (BreakerState::HalfOpen, true) if trial => {
                core.consecutive_failures = 0;
                core.opened_at = None;
                core.opened_at_wall = None;
                Some(Self::transition(&mut core, BreakerState::Closed))
            }
            (BreakerState::HalfOpen, false) if trial => {
                core.consecutive_failures += 1;
                Some(Self::open(&mut core))
            }
            _ => None,
        };
        if let Some((from, to)) = change {
            self.announce(from, to);
        }
    }

    fn open(core: &mut BreakerCore) -> (BreakerState, BreakerState) {
        core.opened_at = Some(Instant::now());
        core.opened_at_wall = Some(Utc::now());
        Self::transition(core, BreakerState::Open)
    }

    fn transition(core: &mut BreakerCore, to: BreakerState) -> (BreakerState, BreakerState) {
        let from = core.state;
        core.state = to;
        core.epoch += 1;
        (from, to)
    }

    /// Called with the core lock held so sinks see transitions in order.
    fn announce(&self, from: BreakerState, to: BreakerState) {
        match to {
            BreakerState::Open => tracing::warn!(
                provider = %self.inner.name,
                from = %from,
                reset_timeout_ms = self.inner.config.reset_timeout.as_millis() as u64,
                "Circuit opened"
            ),
            _ => tracing::info!(provider = %self.inner.name, from = %from, to = %to, "Circuit state changed"),
        }
        self.inner.events.emit(EngineEvent::BreakerStateChanged {
            provider: self.inner.name.clone(),
            from,
            to,
        });
    }

    pub(crate) fn report_call(&self, result: CallResult) {
        self.inner.events.emit(EngineEvent::ProviderCall {
            provider: self.inner.name.clone(),
            result,
        });
    }

    /// Current state without applying any pending Open→HalfOpen transition
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    /// When the breaker last opened, if it is not Closed
    pub fn opened_at(&self) -> Option<Instant> {
        self.lock().opened_at
    }

    /// Force the breaker back to Closed.
    pub fn reset(&self) {
        let mut core = self.lock();
        core.consecutive_failures = 0;
        core.opened_at = None;
        core.opened_at_wall = None;
        let change = (core.state != BreakerState::Closed).then(|| Self::transition(&mut core, BreakerState::Closed));
        if let Some((from, to)) = change {
            self.announce(from, to);
        }
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let core = self.lock();
        BreakerSnapshot {
            service_name: self.inner.name.clone(),
            state: core.state,
            consecutive_failures: core.consecutive_failures,
            opened_at: core.opened_at_wall,
            failure_threshold: self.inner.config.failure_threshold,
            reset_timeout_ms: self.inner.config.reset_timeout.as_millis() as u64,
        }
    }

    /// Rebuild state from a persisted snapshot.
    ///
    /// Thresholds come from the live config, not the snapshot. A snapshot taken
    /// mid-trial restores as Open and immediately eligible for a new trial.
    pub fn restore(&self, snapshot: &BreakerSnapshot) {
        let mut core = self.lock();
        let from = core.state;
        core.consecutive_failures = snapshot.consecutive_failures;

        match snapshot.state {
            BreakerState::Closed => {
                core.state = BreakerState::Closed;
                core.opened_at = None;
                core.opened_at_wall = None;
            }
            BreakerState::Open | BreakerState::HalfOpen => {
                let now_wall = Utc::now();
                let elapsed = match (snapshot.state, snapshot.opened_at) {
                    (BreakerState::Open, Some(at)) => (now_wall - at).to_std().unwrap_or(Duration::ZERO),
                    _ => self.inner.config.reset_timeout,
                };
                let now = Instant::now();
                core.state = BreakerState::Open;
                core.opened_at = Some(now.checked_sub(elapsed).unwrap_or(now));
                core.opened_at_wall = snapshot.opened_at.or(Some(now_wall));
            }
        }
        core.epoch += 1;
        let to = core.state;
        if from != to {
            self.announce(from, to);
        }
    }
}
