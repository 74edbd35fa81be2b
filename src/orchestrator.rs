//! Transport-neutral orchestrator surface.
//!
//! [`Orchestrator`] is what the gRPC services, the dashboard and in-process
//! callers talk to. It holds no state of its own: every call is delegated to
//! the job and tracker registries, which do their own locking.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::LivenessPolicy;
use crate::scheduler::{JobRecord, JobRegistry, TrackerRecord, TrackerRegistry};

#[derive(Debug, Clone)]
pub struct Orchestrator {
    jobs: Arc<JobRegistry>,
    trackers: Arc<TrackerRegistry>,
}

impl Orchestrator {
    pub fn new(liveness: LivenessPolicy) -> Self {
        let jobs = Arc::new(JobRegistry::new());
        let trackers = Arc::new(TrackerRegistry::new(liveness, jobs.clone()));
        Self { jobs, trackers }
    }

    pub fn from_parts(jobs: Arc<JobRegistry>, trackers: Arc<TrackerRegistry>) -> Self {
        Self { jobs, trackers }
    }

    pub fn jobs(&self) -> &Arc<JobRegistry> {
        &self.jobs
    }

    pub fn trackers(&self) -> &Arc<TrackerRegistry> {
        &self.trackers
    }

    pub async fn queue_job(&self, job: JobRecord) -> bool {
        self.jobs.submit(job).await
    }

    pub async fn request_job(&self, tracker_id: Uuid) -> Option<JobRecord> {
        self.jobs.assign_next(tracker_id).await
    }

    pub async fn check_in(&self, tracker: TrackerRecord) -> bool {
        self.trackers.check_in(tracker).await
    }

    pub async fn return_finished_job(&self, job: JobRecord) {
        self.jobs.complete(job).await
    }

    pub async fn tracker_status(&self) -> Vec<TrackerRecord> {
        self.trackers.snapshot_all().await
    }

    pub async fn all_jobs(&self) -> Vec<JobRecord> {
        self.jobs.snapshot().await.into_all()
    }

    pub async fn job(&self, job_id: &Uuid) -> Option<JobRecord> {
        self.jobs.get(job_id).await
    }

    pub async fn num_waiting_jobs(&self) -> usize {
        self.jobs.waiting_count().await
    }

    pub fn num_idle_trackers(&self) -> usize {
        self.trackers.idle_count()
    }

    pub fn num_running_trackers(&self) -> usize {
        self.trackers.running_count()
    }

    pub fn ping(&self) -> bool {
        true
    }
}
