use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::scheduler::job::{JobRecord, JobStatus};

/// Point-in-time copy of the three job collections.
#[derive(Debug, Clone, Default)]
pub struct JobSnapshot {
    /// Waiting jobs in dispatch (FIFO) order.
    pub waiting: Vec<JobRecord>,
    pub running: Vec<JobRecord>,
    pub finished: Vec<JobRecord>,
}

impl JobSnapshot {
    pub fn waiting_count(&self) -> usize {
        self.waiting.len()
    }

    /// Every job, finished first, then running, then waiting.
    pub fn into_all(self) -> Vec<JobRecord> {
        let mut all = self.finished;
        all.extend(self.running);
        all.extend(self.waiting);
        all
    }
}

#[derive(Debug, Default)]
struct Collections {
    waiting: VecDeque<JobRecord>,
    running: HashMap<Uuid, JobRecord>,
    finished: HashMap<Uuid, JobRecord>,
}

impl Collections {
    fn contains(&self, job_id: &Uuid) -> bool {
        self.running.contains_key(job_id)
            || self.finished.contains_key(job_id)
            || self.waiting.iter().any(|j| j.id == *job_id)
    }
}

/// Owns every submitted job. A job id lives in exactly one of the waiting,
/// running and finished collections; all three sit behind one lock so each
/// operation is applied atomically.
#[derive(Debug, Default)]
pub struct JobRegistry {
    inner: RwLock<Collections>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the tail of the waiting queue. Returns false, keeping
    /// the original record, when the id is already known.
    pub async fn submit(&self, mut job: JobRecord) -> bool {
        job.status = JobStatus::Queued;
        job.owner = None;
        if job.submit_time.is_none() {
            job.submit_time = Some(Utc::now());
        }

        let job_id = job.id;
        let mut inner = self.inner.write().await;
        if inner.contains(&job_id) {
            tracing::warn!(job_id = %job_id, "Duplicate job id rejected");
            return false;
        }
        inner.waiting.push_back(job);
        tracing::info!(job_id = %job_id, "Job queued");
        true
    }

    /// Pop the oldest waiting job and hand it to `tracker_id`.
    pub async fn assign_next(&self, tracker_id: Uuid) -> Option<JobRecord> {
        self.assign_next_at(tracker_id, Utc::now()).await
    }

    pub async fn assign_next_at(&self, tracker_id: Uuid, now: DateTime<Utc>) -> Option<JobRecord> {
        let mut inner = self.inner.write().await;
        let mut job = inner.waiting.pop_front()?;

        job.status = JobStatus::Running;
        job.owner = Some(tracker_id);
        job.start_time = Some(now);
        inner.running.insert(job.id, job.clone());

        tracing::info!(job_id = %job.id, tracker_id = %tracker_id, "Job assigned");
        Some(job)
    }

    /// Record a finished job. Safe to call repeatedly for the same id: the
    /// first report wins and later ones only make sure the id is no longer
    /// waiting or running. A report from a tracker that no longer owns a
    /// running job is dropped.
    pub async fn complete(&self, job: JobRecord) {
        let job_id = job.id;
        let mut inner = self.inner.write().await;

        if let Some(current) = inner.running.get(&job_id) {
            if job.owner.is_some() && current.owner != job.owner {
                tracing::warn!(
                    job_id = %job_id,
                    reported_by = ?job.owner,
                    owner = ?current.owner,
                    "Completion from a stale owner ignored"
                );
                return;
            }
        }

        let was_running = inner.running.remove(&job_id).is_some();
        let waiting_pos = inner.waiting.iter().position(|j| j.id == job_id);
        let was_waiting = match waiting_pos {
            Some(pos) => inner.waiting.remove(pos).is_some(),
            None => false,
        };

        if inner.finished.contains_key(&job_id) {
            tracing::debug!(job_id = %job_id, "Duplicate completion report ignored");
            return;
        }

        let mut job = job;
        if !job.status.is_terminal() {
            job.status = JobStatus::from_exit_code(job.exit_code.unwrap_or(-1));
        }
        if job.finish_time.is_none() {
            job.finish_time = Some(Utc::now());
        }

        if was_waiting {
            tracing::warn!(job_id = %job_id, "Completion arrived for a requeued job, taking it");
        } else if !was_running {
            tracing::warn!(job_id = %job_id, "Completion for a job that was not running");
        }
        tracing::info!(
            job_id = %job_id,
            status = %job.status,
            exit_code = ?job.exit_code,
            "Job finished"
        );
        inner.finished.insert(job_id, job);
    }

    /// Move a running job back to the tail of the waiting queue. Returns
    /// false, touching nothing, when the job is not running.
    pub async fn requeue(&self, job_id: &Uuid) -> bool {
        let mut inner = self.inner.write().await;
        Self::requeue_locked(&mut inner, job_id)
    }

    /// Like [`requeue`](Self::requeue), but only while `owner` still holds
    /// the job. Eviction goes through here.
    pub async fn requeue_owned(&self, job_id: &Uuid, owner: &Uuid) -> bool {
        let mut inner = self.inner.write().await;
        let owned = inner
            .running
            .get(job_id)
            .is_some_and(|job| job.owner.as_ref() == Some(owner));
        if !owned {
            return false;
        }
        Self::requeue_locked(&mut inner, job_id)
    }

    fn requeue_locked(inner: &mut Collections, job_id: &Uuid) -> bool {
        let Some(mut job) = inner.running.remove(job_id) else {
            return false;
        };

        let previous_owner = job.owner.take();
        job.status = JobStatus::Queued;
        job.start_time = None;
        inner.waiting.push_back(job);

        tracing::info!(job_id = %job_id, previous_owner = ?previous_owner, "Job requeued");
        true
    }

    /// Look a job up in whichever collection holds it.
    pub async fn get(&self, job_id: &Uuid) -> Option<JobRecord> {
        let inner = self.inner.read().await;
        inner
            .running
            .get(job_id)
            .or_else(|| inner.finished.get(job_id))
            .or_else(|| inner.waiting.iter().find(|j| j.id == *job_id))
            .cloned()
    }

    pub async fn waiting_count(&self) -> usize {
        self.inner.read().await.waiting.len()
    }

    pub async fn snapshot(&self) -> JobSnapshot {
        let inner = self.inner.read().await;

        let mut running: Vec<JobRecord> = inner.running.values().cloned().collect();
        running.sort_by_key(|j| j.start_time);
        let mut finished: Vec<JobRecord> = inner.finished.values().cloned().collect();
        finished.sort_by_key(|j| j.finish_time);

        JobSnapshot {
            waiting: inner.waiting.iter().cloned().collect(),
            running,
            finished,
        }
    }
}
