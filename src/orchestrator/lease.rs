//! Dispatch leases: which worker holds which job, and when it last checked in.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// A worker's claim on a dispatched job
#[derive(Debug, Clone, PartialEq)]
pub struct Lease {
    pub worker_id: String,
    pub dispatched_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    /// Last progress reported, 0.0 to 1.0
    pub progress: f64,
}

impl Lease {
    pub fn new(worker_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            worker_id: worker_id.into(),
            dispatched_at: now,
            last_heartbeat: now,
            progress: 0.0,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>, progress: f64) {
        self.last_heartbeat = now;
        if progress.is_finite() {
            self.progress = progress.clamp(0.0, 1.0);
        }
    }

    /// No heartbeat for at least `timeout`
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match (now - self.last_heartbeat).to_std() {
            Ok(silent) => silent >= timeout,
            Err(_) => false,
        }
    }
}

/// Leases of every dispatched job, keyed by job id.
#[derive(Debug, Default)]
pub struct LeaseLedger {
    leases: HashMap<String, Lease>,
}

impl LeaseLedger {
    pub fn grant(&mut self, job_id: &str, worker_id: &str, now: DateTime<Utc>) {
        self.leases.insert(job_id.to_string(), Lease::new(worker_id, now));
    }

    pub fn get(&self, job_id: &str) -> Option<&Lease> {
        self.leases.get(job_id)
    }

    pub fn get_mut(&mut self, job_id: &str) -> Option<&mut Lease> {
        self.leases.get_mut(job_id)
    }

    pub fn release(&mut self, job_id: &str) -> Option<Lease> {
        self.leases.remove(job_id)
    }

    /// Job ids whose lease has gone silent
    pub fn expired(&self, now: DateTime<Utc>, timeout: Duration) -> Vec<String> {
        let mut ids: Vec<String> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.is_expired(now, timeout))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.leases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leases.is_empty()
    }
}
