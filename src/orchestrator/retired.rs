//! Recently finished jobs.
//!
//! Terminal jobs leave the engine's index once persisted. Their final status is
//! remembered here, oldest evicted first, so late reports and heartbeats still
//! get a precise answer instead of "unknown job".

use std::collections::{HashMap, VecDeque};

use crate::domain::JobStatus;

#[derive(Debug, Default)]
pub struct RetiredJobs {
    capacity: usize,
    order: VecDeque<String>,
    statuses: HashMap<String, JobStatus>,
}

impl RetiredJobs {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            statuses: HashMap::new(),
        }
    }

    /// Remember a job's final status, forgetting the oldest entry when full.
    pub fn record(&mut self, job_id: &str, status: JobStatus) {
        if self.capacity == 0 {
            return;
        }
        if self.statuses.insert(job_id.to_string(), status).is_some() {
            return;
        }
        self.order.push_back(job_id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.statuses.remove(&oldest);
            }
        }
    }

    pub fn status(&self, job_id: &str) -> Option<JobStatus> {
        self.statuses.get(job_id).copied()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.statuses.contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_lookup() {
        let mut retired = RetiredJobs::new(4);
        retired.record("job-1", JobStatus::Completed);
        assert_eq!(retired.status("job-1"), Some(JobStatus::Completed));
        assert!(retired.status("job-2").is_none());
    }

    #[test]
    fn test_oldest_evicted_at_capacity() {
        let mut retired = RetiredJobs::new(2);
        retired.record("job-1", JobStatus::Completed);
        retired.record("job-2", JobStatus::Exhausted);
        retired.record("job-3", JobStatus::Cancelled);
        assert_eq!(retired.len(), 2);
        assert!(!retired.contains("job-1"));
        assert_eq!(retired.status("job-3"), Some(JobStatus::Cancelled));
    }

    #[test]
    fn test_duplicate_record_does_not_grow() {
        let mut retired = RetiredJobs::new(2);
        retired.record("job-1", JobStatus::Completed);
        retired.record("job-1", JobStatus::Completed);
        retired.record("job-2", JobStatus::Completed);
        assert_eq!(retired.len(), 2);
        assert!(retired.contains("job-1"));
    }

    #[test]
    fn test_zero_capacity_remembers_nothing() {
        let mut retired = RetiredJobs::new(0);
        retired.record("job-1", JobStatus::Completed);
        assert!(retired.is_empty());
    }
}
