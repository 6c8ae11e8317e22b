//! Composite ordering for queued jobs.
//!
//! Jobs are ordered by:
//! - Priority tier (higher first)
//! - Success probability (higher first)
//! - Wait time (older first)
//! - Insertion sequence (earlier first), so the order is total

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::domain::SubmissionJob;

/// Ordering key of a ready job. The greatest key is dequeued first.
#[derive(Debug, Clone, Copy)]
pub struct PriorityKey {
    pub tier: u8,
    pub probability: f64,
    pub created_at: DateTime<Utc>,
    pub sequence: u64,
}

impl PriorityKey {
    pub fn for_job(job: &SubmissionJob, sequence: u64) -> Self {
        Self {
            tier: job.priority_tier,
            probability: job.success_probability,
            created_at: job.created_at,
            sequence,
        }
    }
}

impl Ord for PriorityKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.tier
            .cmp(&other.tier)
            .then_with(|| self.probability.total_cmp(&other.probability))
            // Older jobs have waited longer
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for PriorityKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PriorityKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PriorityKey {}

/// Ordering key of a delayed job. The greatest key becomes due first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueKey {
    pub scheduled_at: DateTime<Utc>,
    pub sequence: u64,
}

impl Ord for DueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .scheduled_at
            .cmp(&self.scheduled_at)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for DueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SubmissionTarget;
    use chrono::Duration;

    fn job(tier: u8, probability: f64) -> SubmissionJob {
        let mut job = SubmissionJob::new(SubmissionTarget::new("d", "d.com", "b", "B"), tier, 3);
        job.success_probability = probability;
        job
    }

    #[test]
    fn test_tier_dominates_probability() {
        let a = PriorityKey::for_job(&job(2, 0.9), 0);
        let b = PriorityKey::for_job(&job(3, 0.1), 1);
        assert!(b > a);
    }

    #[test]
    fn test_probability_breaks_tier_tie() {
        let a = PriorityKey::for_job(&job(2, 0.4), 0);
        let b = PriorityKey::for_job(&job(2, 0.6), 1);
        assert!(b > a);
    }

    #[test]
    fn test_older_job_wins_tie() {
        let mut old = job(2, 0.5);
        old.created_at -= Duration::minutes(5);
        let new = job(2, 0.5);
        assert!(PriorityKey::for_job(&old, 1) > PriorityKey::for_job(&new, 0));
    }

    #[test]
    fn test_sequence_is_final_tiebreak() {
        let j = job(1, 0.5);
        assert!(PriorityKey::for_job(&j, 0) > PriorityKey::for_job(&j, 1));
    }

    #[test]
    fn test_due_key_earliest_first() {
        let now = Utc::now();
        let soon = DueKey {
            scheduled_at: now,
            sequence: 5,
        };
        let later = DueKey {
            scheduled_at: now + Duration::seconds(1),
            sequence: 0,
        };
        assert!(soon > later);
    }
}
