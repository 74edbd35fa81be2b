use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::LivenessPolicy;
use crate::scheduler::registry::JobRegistry;
use crate::scheduler::tracker::{TrackerRecord, TrackerStatus};

/// Outcome of one scrub pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrubReport {
    /// Trackers newly flagged `NoResponse` in this pass.
    pub flagged: Vec<Uuid>,
    /// Trackers removed from the registry.
    pub evicted: Vec<Uuid>,
    /// Jobs returned to the waiting queue because their owner was evicted.
    pub requeued: Vec<Uuid>,
}

/// Registry of known trackers and their liveness.
///
/// Trackers are added by their first heartbeat and only ever removed by a
/// scrub pass. Job state is never touched directly: eviction asks the
/// [`JobRegistry`] to requeue by id.
#[derive(Debug)]
pub struct TrackerRegistry {
    trackers: RwLock<HashMap<Uuid, TrackerRecord>>,
    jobs: Arc<JobRegistry>,
    liveness: LivenessPolicy,
    idle_count: AtomicUsize,
    running_count: AtomicUsize,
}

impl TrackerRegistry {
    pub fn new(liveness: LivenessPolicy, jobs: Arc<JobRegistry>) -> Self {
        Self {
            trackers: RwLock::new(HashMap::new()),
            jobs,
            liveness,
            idle_count: AtomicUsize::new(0),
            running_count: AtomicUsize::new(0),
        }
    }

    pub fn liveness(&self) -> LivenessPolicy {
        self.liveness
    }

    /// Accept a heartbeat. Unknown trackers are registered; known trackers
    /// have their reported fields replaced, which also clears `NoResponse`.
    pub async fn check_in(&self, tracker: TrackerRecord) -> bool {
        self.check_in_at(tracker, Utc::now()).await
    }

    pub async fn check_in_at(&self, mut tracker: TrackerRecord, now: DateTime<Utc>) -> bool {
        tracker.last_checkin = Some(now);
        let tracker_id = tracker.id;

        let mut trackers = self.trackers.write().await;
        match trackers.get_mut(&tracker_id) {
            Some(known) => {
                if known.status == TrackerStatus::NoResponse {
                    tracing::info!(tracker_id = %tracker_id, host = %tracker.host_label, "Tracker responding again");
                }
                known.host_label = tracker.host_label;
                known.status = tracker.status;
                known.current_job = tracker.current_job;
                known.last_checkin = tracker.last_checkin;
                tracing::trace!(tracker_id = %tracker_id, status = %known.status, "Tracker checked in");
            }
            None => {
                tracing::info!(
                    tracker_id = %tracker_id,
                    host = %tracker.host_label,
                    status = %tracker.status,
                    "Tracker registered"
                );
                trackers.insert(tracker_id, tracker);
            }
        }
        true
    }

    pub async fn get(&self, tracker_id: &Uuid) -> Option<TrackerRecord> {
        self.trackers.read().await.get(tracker_id).cloned()
    }

    /// Copy of every known tracker, ordered by host label then id.
    pub async fn snapshot_all(&self) -> Vec<TrackerRecord> {
        let mut all: Vec<TrackerRecord> = self.trackers.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.host_label.cmp(&b.host_label).then(a.id.cmp(&b.id)));
        all
    }

    /// Idle trackers as of the last scrub pass.
    pub fn idle_count(&self) -> usize {
        self.idle_count.load(Ordering::Relaxed)
    }

    /// Running trackers as of the last scrub pass.
    pub fn running_count(&self) -> usize {
        self.running_count.load(Ordering::Relaxed)
    }

    pub async fn scrub(&self) -> ScrubReport {
        self.scrub_at(Utc::now()).await
    }

    /// Evict trackers that have been flagged and silent for the eviction
    /// threshold, flag trackers silent for the liveness timeout, then refresh
    /// the cached idle/running counters.
    pub async fn scrub_at(&self, now: DateTime<Utc>) -> ScrubReport {
        let timeout_ms = self.liveness.timeout_ms() as i64;
        let evict_after_ms = self.liveness.evict_after_ms() as i64;
        let mut report = ScrubReport::default();
        let mut evicted = Vec::new();

        {
            let mut trackers = self.trackers.write().await;

            let doomed: Vec<Uuid> = trackers
                .values()
                .filter(|t| {
                    t.status == TrackerStatus::NoResponse
                        && t.silence_ms(now).is_some_and(|ms| ms >= evict_after_ms)
                })
                .map(|t| t.id)
                .collect();

            for tracker_id in doomed {
                if let Some(tracker) = trackers.remove(&tracker_id) {
                    tracing::warn!(
                        tracker_id = %tracker_id,
                        host = %tracker.host_label,
                        silent_ms = ?tracker.silence_ms(now),
                        "Tracker evicted"
                    );
                    report.evicted.push(tracker_id);
                    evicted.push(tracker);
                }
            }

            for tracker in trackers.values_mut() {
                if !tracker.silence_ms(now).is_some_and(|ms| ms >= timeout_ms) {
                    continue;
                }
                if tracker.status != TrackerStatus::NoResponse {
                    tracing::info!(
                        tracker_id = %tracker.id,
                        host = %tracker.host_label,
                        "Tracker marked as not responding"
                    );
                    report.flagged.push(tracker.id);
                }
                tracker.status = TrackerStatus::NoResponse;
            }

            let (idle, running) =
                trackers
                    .values()
                    .fold((0, 0), |(idle, running), t| match t.status {
                        TrackerStatus::Idle => (idle + 1, running),
                        TrackerStatus::Running => (idle, running + 1),
                        TrackerStatus::NoResponse | TrackerStatus::Unknown => (idle, running),
                    });
            self.idle_count.store(idle, Ordering::Relaxed);
            self.running_count.store(running, Ordering::Relaxed);
        }

        // Requeue after releasing the tracker map so the two registries are
        // never locked together.
        for tracker in evicted {
            let Some(job_id) = tracker.current_job else {
                continue;
            };
            if self.jobs.requeue_owned(&job_id, &tracker.id).await {
                report.requeued.push(job_id);
            }
        }

        if !report.flagged.is_empty() || !report.evicted.is_empty() {
            tracing::debug!(
                flagged = report.flagged.len(),
                evicted = report.evicted.len(),
                requeued = report.requeued.len(),
                "Scrub pass finished"
            );
        }
        report
    }
}
