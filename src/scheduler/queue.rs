//! Thread-safe priority queue with a delayed holding area.
//!
//! One mutex guards the ready heap, the delayed heap and the membership index.
//! Heap entries are never removed in place: `remove` drops the membership record
//! and the stale heap entry is skipped when it surfaces.

use std::collections::{BTreeMap, BinaryHeap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;

use crate::domain::SubmissionJob;
use crate::metrics::{EngineEvent, EventSink};
use crate::scheduler::priority::{DueKey, PriorityKey};

/// Counts reported by `PriorityQueue::peek_stats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    /// Jobs eligible for dequeue
    pub depth: usize,
    /// Jobs waiting for their scheduled time
    pub delayed: usize,
    /// All queued jobs by priority tier
    pub by_tier: BTreeMap<u8, usize>,
}

#[derive(Debug)]
struct Member {
    job: SubmissionJob,
    sequence: u64,
    delayed: bool,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ReadyEntry {
    key: PriorityKey,
    job_id: String,
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct DelayedEntry {
    key: DueKey,
    job_id: String,
}

#[derive(Debug, Default)]
struct QueueInner {
    ready: BinaryHeap<ReadyEntry>,
    delayed: BinaryHeap<DelayedEntry>,
    members: HashMap<String, Member>,
    delayed_count: usize,
    next_sequence: u64,
}

impl QueueInner {
    fn stats(&self) -> QueueStats {
        let mut by_tier = BTreeMap::new();
        for member in self.members.values() {
            *by_tier.entry(member.job.priority_tier).or_insert(0) += 1;
        }
        QueueStats {
            depth: self.members.len() - self.delayed_count,
            delayed: self.delayed_count,
            by_tier,
        }
    }

    /// Move every due delayed job to the ready heap. Returns how many moved.
    fn promote_due(&mut self, now: DateTime<Utc>) -> usize {
        let mut promoted = 0;
        while let Some(top) = self.delayed.peek() {
            if top.key.scheduled_at > now {
                break;
            }
            let Some(entry) = self.delayed.pop() else { break };
            let Some(member) = self.members.get_mut(&entry.job_id) else {
                continue;
            };
            if !member.delayed || member.sequence != entry.key.sequence {
                continue;
            }
            member.delayed = false;
            self.delayed_count -= 1;
            self.ready.push(ReadyEntry {
                key: PriorityKey::for_job(&member.job, member.sequence),
                job_id: entry.job_id,
            });
            promoted += 1;
        }
        promoted
    }

    fn pop_ready(&mut self) -> Option<SubmissionJob> {
        while let Some(entry) = self.ready.pop() {
            let live = matches!(
                self.members.get(&entry.job_id),
                Some(m) if !m.delayed && m.sequence == entry.key.sequence
            );
            if live {
                return self.members.remove(&entry.job_id).map(|m| m.job);
            }
        }
        None
    }

    fn next_due(&self) -> Option<DateTime<Utc>> {
        self.delayed.peek().map(|e| e.key.scheduled_at)
    }
}

/// Pending jobs ordered by composite priority.
pub struct PriorityQueue {
    inner: Mutex<QueueInner>,
    notify: Notify,
    events: Arc<dyn EventSink>,
}

impl PriorityQueue {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Emitted under the queue lock so sinks see depth changes in queue order.
    fn publish(&self, stats: &QueueStats) {
        self.events.emit(EngineEvent::QueueDepthChanged {
            ready: stats.depth,
            delayed: stats.delayed,
        });
    }

    /// Add a job. Jobs scheduled in the future go to the delayed area.
    ///
    /// Returns false if a job with the same id is already queued.
    pub fn push(&self, job: SubmissionJob) -> bool {
        self.push_at(job, Utc::now())
    }

    pub fn push_at(&self, job: SubmissionJob, now: DateTime<Utc>) -> bool {
        let stats = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            if inner.members.contains_key(&job.id) {
                tracing::warn!(job_id = %job.id, "Job already queued, push ignored");
                return false;
            }

            let sequence = inner.next_sequence;
            inner.next_sequence += 1;
            let delayed = !job.is_due(now);
            if delayed {
                inner.delayed.push(DelayedEntry {
                    key: DueKey {
                        scheduled_at: job.scheduled_at,
                        sequence,
                    },
                    job_id: job.id.clone(),
                });
                inner.delayed_count += 1;
            } else {
                inner.ready.push(ReadyEntry {
                    key: PriorityKey::for_job(&job, sequence),
                    job_id: job.id.clone(),
                });
            }
            inner.members.insert(job.id.clone(), Member { job, sequence, delayed });
            let stats = inner.stats();
            self.publish(&stats);
            stats
        };

        if stats.depth > 0 {
            self.notify.notify_waiters();
        }
        true
    }

    /// Pop the best eligible job, promoting due delayed jobs first.
    pub fn dequeue(&self, worker_id: &str) -> Option<SubmissionJob> {
        self.dequeue_at(worker_id, Utc::now())
    }

    pub fn dequeue_at(&self, worker_id: &str, now: DateTime<Utc>) -> Option<SubmissionJob> {
        let job = {
            let mut inner = self.lock();
            inner.promote_due(now);
            let job = inner.pop_ready()?;
            self.publish(&inner.stats());
            job
        };
        tracing::debug!(job_id = %job.id, worker_id, "Job dequeued");
        Some(job)
    }

    /// Remove a queued job (ready or delayed).
    pub fn remove(&self, job_id: &str) -> Option<SubmissionJob> {
        let member = {
            let mut inner = self.lock();
            let member = inner.members.remove(job_id)?;
            if member.delayed {
                inner.delayed_count -= 1;
            }
            self.publish(&inner.stats());
            member
        };
        Some(member.job)
    }

    /// Make every delayed job with `scheduled_at <= now` eligible.
    ///
    /// Safe to call repeatedly; each delayed job is moved at most once.
    pub fn promote_due(&self, now: DateTime<Utc>) -> usize {
        let promoted = {
            let mut inner = self.lock();
            let promoted = inner.promote_due(now);
            if promoted > 0 {
                self.publish(&inner.stats());
            }
            promoted
        };
        if promoted > 0 {
            tracing::debug!(promoted, "Delayed jobs promoted");
            self.notify.notify_waiters();
        }
        promoted
    }

    pub fn peek_stats(&self) -> QueueStats {
        self.lock().stats()
    }

    pub fn contains(&self, job_id: &str) -> bool {
        self.lock().members.contains_key(job_id)
    }

    pub fn len(&self) -> usize {
        self.lock().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// When the earliest delayed job becomes due
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.lock().next_due()
    }

    /// Wait until a job may be eligible, or `max_wait` passes.
    ///
    /// Wakes on push, on promotion, and when the earliest delayed job is due.
    pub async fn wait_for_work(&self, max_wait: Duration) {
        let notified = self.notify.notified();
        let now = Utc::now();
        let wait = {
            let inner = self.lock();
            if inner.members.len() > inner.delayed_count {
                return;
            }
            match inner.next_due() {
                Some(due) if due <= now => return,
                Some(due) => (due - now).to_std().unwrap_or_default().min(max_wait),
                None => max_wait,
            }
        };
        let _ = tokio::time::timeout(wait, notified).await;
    }
}

impl std::fmt::Debug for PriorityQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue").field("stats", &self.peek_stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SubmissionTarget;
    use crate::metrics::{MetricsAggregator, NoopSink, RecordingSink};
    use chrono::Duration as ChronoDuration;
    use std::collections::HashSet;

    fn queue() -> PriorityQueue {
        PriorityQueue::new(Arc::new(NoopSink))
    }

    fn job(tier: u8, probability: f64) -> SubmissionJob {
        let mut job = SubmissionJob::new(SubmissionTarget::new("dir", "dir.com", "biz", "Biz"), tier, 3);
        job.success_probability = probability;
        job
    }

    #[test]
    fn test_higher_tier_dequeues_first() {
        let q = queue();
        let a = job(2, 0.9);
        let b = job(3, 0.1);
        let b_id = b.id.clone();
        q.push(a);
        q.push(b);
        assert_eq!(q.dequeue("w").unwrap().id, b_id);
    }

    #[test]
    fn test_equal_jobs_dequeue_oldest_first() {
        let q = queue();
        let base = Utc::now() - ChronoDuration::minutes(10);
        let mut ids = Vec::new();
        for i in 0..5 {
            let mut j = job(1, 0.5);
            j.created_at = base + ChronoDuration::seconds(i);
            ids.push(j.id.clone());
            q.push(j);
        }
        let order: Vec<String> = std::iter::from_fn(|| q.dequeue("w").map(|j| j.id)).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn test_created_at_beats_insertion_order() {
        let q = queue();
        let now = Utc::now();
        let mut newer = job(1, 0.5);
        newer.created_at = now;
        let mut older = job(1, 0.5);
        older.created_at = now - ChronoDuration::minutes(1);
        let older_id = older.id.clone();
        q.push(newer);
        q.push(older);
        assert_eq!(q.dequeue("w").unwrap().id, older_id);
    }

    #[test]
    fn test_delayed_job_waits_until_due() {
        let q = queue();
        let now = Utc::now();
        let mut j = job(3, 0.9);
        j.scheduled_at = now + ChronoDuration::seconds(30);
        let id = j.id.clone();
        q.push_at(j, now);

        assert_eq!(q.peek_stats().delayed, 1);
        assert!(q.dequeue_at("w", now).is_none());
        assert!(q.dequeue_at("w", now + ChronoDuration::seconds(29)).is_none());
        assert_eq!(q.dequeue_at("w", now + ChronoDuration::seconds(30)).unwrap().id, id);
        assert!(q.is_empty());
    }

    #[test]
    fn test_promote_due_is_idempotent() {
        let q = queue();
        let now = Utc::now();
        let mut j = job(1, 0.5);
        j.scheduled_at = now + ChronoDuration::seconds(1);
        q.push_at(j, now);

        let later = now + ChronoDuration::seconds(2);
        assert_eq!(q.promote_due(later), 1);
        assert_eq!(q.promote_due(later), 0);
        let stats = q.peek_stats();
        assert_eq!(stats.depth, 1);
        assert_eq!(stats.delayed, 0);
        assert!(q.dequeue_at("w", later).is_some());
        assert!(q.dequeue_at("w", later).is_none());
    }

    #[test]
    fn test_remove_skips_stale_heap_entry() {
        let q = queue();
        let a = job(3, 0.5);
        let b = job(1, 0.5);
        let a_id = a.id.clone();
        let b_id = b.id.clone();
        q.push(a);
        q.push(b);

        assert_eq!(q.remove(&a_id).unwrap().id, a_id);
        assert!(q.remove(&a_id).is_none());
        assert_eq!(q.dequeue("w").unwrap().id, b_id);
        assert!(q.dequeue("w").is_none());
    }

    #[test]
    fn test_remove_delayed_job() {
        let q = queue();
        let now = Utc::now();
        let mut j = job(1, 0.5);
        j.scheduled_at = now + ChronoDuration::seconds(5);
        let id = j.id.clone();
        q.push_at(j, now);
        assert!(q.remove(&id).is_some());
        assert_eq!(q.peek_stats(), QueueStats::default());
        assert_eq!(q.promote_due(now + ChronoDuration::seconds(10)), 0);
    }

    #[test]
    fn test_duplicate_push_refused() {
        let q = queue();
        let j = job(1, 0.5);
        assert!(q.push(j.clone()));
        assert!(!q.push(j));
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn test_readd_after_remove() {
        let q = queue();
        let j = job(1, 0.5);
        let id = j.id.clone();
        q.push(j.clone());
        q.remove(&id);
        q.push(j);
        assert_eq!(q.dequeue("w").unwrap().id, id);
        assert!(q.dequeue("w").is_none());
    }

    #[test]
    fn test_stats_by_tier() {
        let q = queue();
        q.push(job(1, 0.5));
        q.push(job(1, 0.5));
        q.push(job(3, 0.5));
        let stats = q.peek_stats();
        assert_eq!(stats.depth, 3);
        assert_eq!(stats.by_tier.get(&1), Some(&2));
        assert_eq!(stats.by_tier.get(&3), Some(&1));
    }

    #[test]
    fn test_emits_depth_events() {
        let sink = RecordingSink::new();
        let q = PriorityQueue::new(sink.clone());
        q.push(job(1, 0.5));
        q.dequeue("w");
        let events = sink.events();
        assert_eq!(
            events,
            vec![
                EngineEvent::QueueDepthChanged { ready: 1, delayed: 0 },
                EngineEvent::QueueDepthChanged { ready: 0, delayed: 0 },
            ]
        );
    }

    /// Stalls on the first non-empty depth event, then forwards to metrics
    struct StallingSink {
        metrics: Arc<MetricsAggregator>,
    }

    impl EventSink for StallingSink {
        fn emit(&self, event: EngineEvent) {
            if matches!(event, EngineEvent::QueueDepthChanged { ready: 1, .. }) {
                std::thread::sleep(std::time::Duration::from_millis(50));
            }
            self.metrics.emit(event);
        }
    }

    #[test]
    fn test_depth_metric_matches_queue_under_slow_sink() {
        let metrics = MetricsAggregator::new();
        let q = Arc::new(PriorityQueue::new(Arc::new(StallingSink {
            metrics: metrics.clone(),
        })));

        std::thread::scope(|s| {
            let pusher = q.clone();
            s.spawn(move || {
                pusher.push(job(1, 0.5));
            });
            let worker = q.clone();
            s.spawn(move || {
                while worker.dequeue("w").is_none() {
                    std::thread::yield_now();
                }
            });
        });

        assert_eq!(q.peek_stats().depth, 0);
        assert_eq!(metrics.snapshot().queue_depth, 0);
    }

    #[test]
    fn test_concurrent_dequeue_exactly_once() {
        let q = Arc::new(queue());
        let mut expected = HashSet::new();
        for i in 0..400 {
            let j = job((i % 4) as u8, 0.5);
            expected.insert(j.id.clone());
            q.push(j);
        }

        let seen: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|w| {
                    let q = q.clone();
                    s.spawn(move || {
                        let worker = format!("w{}", w);
                        let mut got = Vec::new();
                        while let Some(j) = q.dequeue(&worker) {
                            got.push(j.id);
                        }
                        got
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(seen.len(), 400);
        let unique: HashSet<String> = seen.into_iter().collect();
        assert_eq!(unique, expected);
    }

    #[tokio::test]
    async fn test_wait_for_work_wakes_on_push() {
        let q = Arc::new(queue());
        let waiter = {
            let q = q.clone();
            tokio::spawn(async move {
                q.wait_for_work(std::time::Duration::from_secs(10)).await;
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        q.push(job(1, 0.5));
        tokio::time::timeout(std::time::Duration::from_secs(2), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_for_work_returns_immediately_when_ready() {
        let q = queue();
        q.push(job(1, 0.5));
        tokio::time::timeout(std::time::Duration::from_millis(100), q.wait_for_work(std::time::Duration::from_secs(10)))
            .await
            .unwrap();
    }
}
