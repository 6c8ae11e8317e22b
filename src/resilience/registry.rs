//! Owned registry holding one breaker per advisory capability.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::Capability;
use crate::metrics::EventSink;
use crate::resilience::breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker};

/// Breakers for every capability, built once at orchestrator start.
#[derive(Debug, Clone)]
pub struct CircuitBreakerRegistry {
    breakers: HashMap<Capability, CircuitBreaker>,
}

impl CircuitBreakerRegistry {
    /// Build a breaker for each capability, using `config_for` to pick thresholds.
    pub fn new<F>(events: Arc<dyn EventSink>, config_for: F) -> Self
    where
        F: Fn(Capability) -> BreakerConfig,
    {
        let breakers = Capability::ALL
            .into_iter()
            .map(|cap| (cap, CircuitBreaker::new(cap.as_str(), config_for(cap), events.clone())))
            .collect();
        Self { breakers }
    }

    /// Same thresholds for every capability.
    pub fn uniform(events: Arc<dyn EventSink>, config: BreakerConfig) -> Self {
        Self::new(events, |_| config)
    }

    pub fn get(&self, capability: Capability) -> &CircuitBreaker {
        // Every capability is inserted by the constructors
        &self.breakers[&capability]
    }

    /// Breakers ordered by capability
    pub fn iter(&self) -> impl Iterator<Item = (Capability, &CircuitBreaker)> {
        Capability::ALL.into_iter().map(move |cap| (cap, self.get(cap)))
    }

    pub fn states(&self) -> Vec<(Capability, BreakerState)> {
        self.iter().map(|(cap, b)| (cap, b.state())).collect()
    }

    pub fn snapshots(&self) -> Vec<BreakerSnapshot> {
        self.iter().map(|(_, b)| b.snapshot()).collect()
    }

    /// Restore breakers whose service name matches a snapshot. Returns how many matched.
    pub fn restore(&self, snapshots: &[BreakerSnapshot]) -> usize {
        let mut restored = 0;
        for snapshot in snapshots {
            if let Some((_, breaker)) = self.iter().find(|(_, b)| b.name() == snapshot.service_name) {
                breaker.restore(snapshot);
                restored += 1;
            } else {
                tracing::warn!(service = %snapshot.service_name, "No breaker for persisted snapshot");
            }
        }
        restored
    }
}
