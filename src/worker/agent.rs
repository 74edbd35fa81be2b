use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::AgentIntervals;
use crate::scheduler::{JobRecord, TrackerRecord};
use crate::worker::client::OrchestratorClient;
use crate::worker::executor::{ExecutionResult, JobExecutor};
use crate::worker::heartbeat::HeartbeatSender;

/// Result of one job request.
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Acquired(JobRecord),
    NoJobAvailable,
    Unreachable,
}

/// Delay before the next job request, or `None` while a job is in flight.
pub fn next_poll_delay(outcome: &PollOutcome, intervals: &AgentIntervals) -> Option<Duration> {
    match outcome {
        PollOutcome::Acquired(_) => None,
        PollOutcome::NoJobAvailable => Some(intervals.poll),
        PollOutcome::Unreachable => Some(intervals.backoff),
    }
}

/// The tracker side of the protocol: heartbeats, job polling, a single
/// executor slot and at-least-once delivery of finished jobs.
pub struct TrackerAgent {
    tracker: Arc<RwLock<TrackerRecord>>,
    client: Arc<dyn OrchestratorClient>,
    executor: Arc<dyn JobExecutor>,
    intervals: AgentIntervals,
    /// Finished jobs the orchestrator has not acknowledged yet, oldest first.
    unacknowledged: Mutex<Vec<JobRecord>>,
}

impl TrackerAgent {
    pub fn new(
        mut tracker: TrackerRecord,
        client: Arc<dyn OrchestratorClient>,
        executor: Arc<dyn JobExecutor>,
        intervals: AgentIntervals,
    ) -> Self {
        tracker.set_idle();
        Self {
            tracker: Arc::new(RwLock::new(tracker)),
            client,
            executor,
            intervals,
            unacknowledged: Mutex::new(Vec::new()),
        }
    }

    /// Current view of this tracker, as sent with the next heartbeat.
    pub async fn tracker(&self) -> TrackerRecord {
        self.tracker.read().await.clone()
    }

    pub async fn unacknowledged(&self) -> Vec<JobRecord> {
        self.unacknowledged.lock().await.clone()
    }

    /// Request one job from the orchestrator.
    ///
    /// Undelivered completions are flushed first, so a poll doubles as the
    /// retry trigger after an outage.
    pub async fn poll_once(&self) -> PollOutcome {
        if !self.unacknowledged.lock().await.is_empty() {
            self.flush_completed().await;
        }

        let snapshot = self.tracker().await;
        match self.client.request_job(&snapshot).await {
            Ok(Some(job)) => {
                self.tracker.write().await.set_running(job.id);
                tracing::info!(tracker_id = %snapshot.id, job_id = %job.id, name = %job.display_name(), "Job acquired");
                PollOutcome::Acquired(job)
            }
            Ok(None) => {
                tracing::debug!(tracker_id = %snapshot.id, "No job available");
                PollOutcome::NoJobAvailable
            }
            Err(e) => {
                tracing::warn!(tracker_id = %snapshot.id, error = %e, "Job request failed");
                PollOutcome::Unreachable
            }
        }
    }

    /// Deliver unacknowledged completions in order, stopping at the first
    /// failure. Returns how many remain undelivered.
    pub async fn flush_completed(&self) -> usize {
        let mut pending = self.unacknowledged.lock().await;

        while let Some(job) = pending.first() {
            match self.client.return_finished_job(job).await {
                Ok(()) => {
                    tracing::info!(job_id = %job.id, status = %job.status, "Completion delivered");
                    pending.remove(0);
                }
                Err(e) => {
                    tracing::warn!(
                        job_id = %job.id,
                        remaining = pending.len(),
                        error = %e,
                        "Completion delivery failed, will retry"
                    );
                    break;
                }
            }
        }

        pending.len()
    }

    /// Record an executor result: the tracker goes back to idle and the
    /// finished job joins the delivery list, which is then flushed.
    pub async fn complete(&self, mut job: JobRecord, result: ExecutionResult) -> usize {
        job.finish(result.exit_code, Utc::now());
        self.tracker.write().await.set_idle();

        self.unacknowledged.lock().await.push(job);
        self.flush_completed().await
    }

    /// Run the agent until `shutdown` fires.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let heartbeat = {
            let sender = HeartbeatSender::new(self.intervals.heartbeat);
            let tracker = self.tracker.clone();
            let client = self.client.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { sender.run(tracker, client, shutdown).await })
        };

        // Capacity 1: the poll loop is suspended while a job is in flight.
        let (job_tx, mut job_rx) = mpsc::channel::<JobRecord>(1);
        let (done_tx, mut done_rx) = mpsc::channel::<(JobRecord, ExecutionResult)>(1);

        let worker = {
            let executor = self.executor.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let job = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        job = job_rx.recv() => match job {
                            Some(job) => job,
                            None => break,
                        },
                    };

                    let result = executor.execute(&job).await;
                    if done_tx.send((job, result)).await.is_err() {
                        break;
                    }
                }
            })
        };

        let tracker_id = self.tracker.read().await.id;
        tracing::info!(tracker_id = %tracker_id, "Tracker agent started");

        let mut next_fire = Some(Duration::ZERO);
        loop {
            let delay = next_fire;
            let poll_timer = async move {
                match delay {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = poll_timer => {
                    let outcome = self.poll_once().await;
                    next_fire = next_poll_delay(&outcome, &self.intervals);
                    if let PollOutcome::Acquired(job) = outcome {
                        if job_tx.send(job).await.is_err() {
                            break;
                        }
                    }
                }
                Some((job, result)) = done_rx.recv() => {
                    let remaining = self.complete(job, result).await;
                    tracing::debug!(tracker_id = %tracker_id, remaining, "Completion handled");
                    next_fire = Some(Duration::ZERO);
                }
            }
        }

        // An in-flight simulation is left to finish on its own.
        worker.abort();
        let _ = heartbeat.await;
        tracing::info!(tracker_id = %tracker_id, "Tracker agent stopped");
    }
}
