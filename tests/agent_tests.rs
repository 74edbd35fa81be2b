
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use simfleet::config::{AgentIntervals, LivenessPolicy};
use simfleet::error::{FleetError, Result};
use simfleet::scheduler::{JobRecord, JobStatus, TrackerRecord, TrackerStatus};
use simfleet::worker::{
    ExecutionResult, JobExecutor, OrchestratorClient, PollOutcome, TrackerAgent,
};
use simfleet::Orchestrator;
use test_harness::assert_eventually;
use tokio_util::sync::CancellationToken;

/// Orchestrator stand-in that can be taken offline.
#[derive(Default)]
struct FakeClient {
    offline: AtomicBool,
    jobs: Mutex<VecDeque<JobRecord>>,
    delivered: Mutex<Vec<JobRecord>>,
    check_ins: Mutex<Vec<TrackerRecord>>,
    requests: AtomicUsize,
}

impl FakeClient {
    fn with_jobs(jobs: Vec<JobRecord>) -> Arc<Self> {
        let client = Self::default();
        *client.jobs.lock().unwrap() = jobs.into();
        Arc::new(client)
    }

    fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(FleetError::Unreachable("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn delivered_ids(&self) -> Vec<uuid::Uuid> {
        self.delivered.lock().unwrap().iter().map(|j| j.id).collect()
    }
}

#[tonic::async_trait]
impl OrchestratorClient for FakeClient {
    async fn check_in(&self, tracker: &TrackerRecord) -> Result<bool> {
        self.check()?;
        self.check_ins.lock().unwrap().push(tracker.clone());
        Ok(true)
    }

    async fn request_job(&self, tracker: &TrackerRecord) -> Result<Option<JobRecord>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(self.jobs.lock().unwrap().pop_front().map(|mut job| {
            job.status = JobStatus::Running;
            job.owner = Some(tracker.id);
            job
        }))
    }

    async fn return_finished_job(&self, job: &JobRecord) -> Result<()> {
        self.check()?;
        self.delivered.lock().unwrap().push(job.clone());
        Ok(())
    }
}

/// Executor that returns a fixed exit code after a short delay.
struct FakeExecutor {
    exit_code: i32,
    delay: Duration,
    executed: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeExecutor {
    fn new(exit_code: i32, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            exit_code,
            delay,
            executed: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }
}

#[tonic::async_trait]
impl JobExecutor for FakeExecutor {
    async fn execute(&self, job: &JobRecord) -> ExecutionResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.executed.fetch_add(1, Ordering::SeqCst);
        ExecutionResult::from_exit_code(job.id, self.exit_code, None)
    }
}

fn fast_intervals() -> AgentIntervals {
    AgentIntervals {
        heartbeat: Duration::from_millis(20),
        poll: Duration::from_millis(20),
        backoff: Duration::from_millis(60),
    }
}

fn job(name: &str) -> JobRecord {
    JobRecord::new("model.envx", "/projects/src", "/projects/results").with_name(name)
}

fn agent(client: Arc<dyn OrchestratorClient>, executor: Arc<dyn JobExecutor>) -> TrackerAgent {
    TrackerAgent::new(
        TrackerRecord::new("node-1"),
        client,
        executor,
        fast_intervals(),
    )
}

#[tokio::test]
async fn test_new_agent_reports_idle() {
    let client = FakeClient::with_jobs(vec![]);
    let agent = agent(client, FakeExecutor::new(0, Duration::ZERO));

    let tracker = agent.tracker().await;
    assert_eq!(tracker.status, TrackerStatus::Idle);
    assert!(tracker.current_job.is_none());
}

#[tokio::test]
async fn test_poll_outcomes() {
    let j1 = job("j1");
    let j1_id = j1.id;
    let client = FakeClient::with_jobs(vec![j1]);
    let agent = agent(client.clone(), FakeExecutor::new(0, Duration::ZERO));

    match agent.poll_once().await {
        PollOutcome::Acquired(job) => assert_eq!(job.id, j1_id),
        other => panic!("expected a job, got {:?}", other),
    }
    let tracker = agent.tracker().await;
    assert_eq!(tracker.status, TrackerStatus::Running);
    assert_eq!(tracker.current_job, Some(j1_id));

    assert_eq!(agent.poll_once().await, PollOutcome::NoJobAvailable);

    client.set_offline(true);
    assert_eq!(agent.poll_once().await, PollOutcome::Unreachable);
}

#[tokio::test]
async fn test_completion_is_kept_until_delivered() {
    let client = FakeClient::with_jobs(vec![job("j1")]);
    let agent = agent(client.clone(), FakeExecutor::new(0, Duration::ZERO));

    let PollOutcome::Acquired(acquired) = agent.poll_once().await else {
        panic!("expected a job");
    };

    client.set_offline(true);
    let remaining = agent
        .complete(acquired.clone(), ExecutionResult::from_exit_code(acquired.id, 0, None))
        .await;
    assert_eq!(remaining, 1);
    assert_eq!(agent.tracker().await.status, TrackerStatus::Idle);

    let pending = agent.unacknowledged().await;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, JobStatus::Complete);
    assert_eq!(pending[0].exit_code, Some(0));
    assert!(pending[0].finish_time.is_some());
    assert!(client.delivered_ids().is_empty());

    // Next poll after the outage flushes first
    client.set_offline(false);
    assert_eq!(agent.poll_once().await, PollOutcome::NoJobAvailable);
    assert!(agent.unacknowledged().await.is_empty());
    assert_eq!(client.delivered_ids(), vec![acquired.id]);
}

#[tokio::test]
async fn test_flush_preserves_completion_order() {
    let client = FakeClient::with_jobs(vec![]);
    let agent = agent(client.clone(), FakeExecutor::new(0, Duration::ZERO));

    client.set_offline(true);
    let first = job("first");
    let second = job("second");
    agent
        .complete(first.clone(), ExecutionResult::from_exit_code(first.id, 0, None))
        .await;
    agent
        .complete(second.clone(), ExecutionResult::from_exit_code(second.id, 9, None))
        .await;
    assert_eq!(agent.unacknowledged().await.len(), 2);

    client.set_offline(false);
    assert_eq!(agent.flush_completed().await, 0);

    assert_eq!(client.delivered_ids(), vec![first.id, second.id]);
    let delivered = client.delivered.lock().unwrap();
    assert_eq!(delivered[1].status, JobStatus::Failed);
    assert_eq!(delivered[1].exit_code, Some(9));
}

#[tokio::test]
async fn test_run_executes_jobs_one_at_a_time() {
    let jobs = vec![job("j1"), job("j2"), job("j3")];
    let ids: Vec<uuid::Uuid> = jobs.iter().map(|j| j.id).collect();
    let client = FakeClient::with_jobs(jobs);
    let executor = FakeExecutor::new(0, Duration::from_millis(30));
    let agent = Arc::new(agent(client.clone(), executor.clone()));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(agent.clone().run(shutdown.clone()));

    assert_eventually(
        || async { client.delivered.lock().unwrap().len() == 3 },
        Duration::from_secs(5),
        "All jobs should be delivered",
    )
    .await;

    assert_eq!(client.delivered_ids(), ids);
    assert_eq!(executor.executed.load(Ordering::SeqCst), 3);
    assert_eq!(executor.max_in_flight.load(Ordering::SeqCst), 1);
    assert!(!client.check_ins.lock().unwrap().is_empty());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_run_backs_off_while_unreachable() {
    let client = FakeClient::with_jobs(vec![]);
    client.set_offline(true);
    let agent = Arc::new(agent(client.clone(), FakeExecutor::new(0, Duration::ZERO)));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(agent.clone().run(shutdown.clone()));

    tokio::time::sleep(Duration::from_millis(300)).await;
    let offline_requests = client.requests.load(Ordering::SeqCst);

    client.set_offline(false);
    tokio::time::sleep(Duration::from_millis(300)).await;
    let online_requests = client.requests.load(Ordering::SeqCst) - offline_requests;

    // 60 ms backoff versus 20 ms polling
    assert!(offline_requests >= 2, "offline requests: {}", offline_requests);
    assert!(
        online_requests > offline_requests,
        "online {} vs offline {}",
        online_requests,
        offline_requests
    );

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_completion_survives_outage() {
    let j1 = job("j1");
    let j1_id = j1.id;
    let client = FakeClient::with_jobs(vec![j1]);
    let executor = FakeExecutor::new(0, Duration::from_millis(300));
    let agent = Arc::new(agent(client.clone(), executor.clone()));

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(agent.clone().run(shutdown.clone()));

    assert_eventually(
        || async { executor.in_flight.load(Ordering::SeqCst) == 1 },
        Duration::from_secs(2),
        "Agent should request a job",
    )
    .await;
    // Orchestrator disappears while the job runs
    client.set_offline(true);

    assert_eventually(
        || async { agent.unacknowledged().await.len() == 1 },
        Duration::from_secs(2),
        "Completion should wait for the orchestrator",
    )
    .await;

    client.set_offline(false);
    assert_eventually(
        || async { client.delivered_ids() == vec![j1_id] },
        Duration::from_secs(2),
        "Completion should be delivered once the orchestrator is back",
    )
    .await;
    assert!(agent.unacknowledged().await.is_empty());

    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_agent_against_in_process_orchestrator() {
    let orchestrator = Orchestrator::new(LivenessPolicy::default());
    for i in 0..2 {
        orchestrator.queue_job(job(&format!("j{}", i))).await;
    }

    let client: Arc<dyn OrchestratorClient> = Arc::new(orchestrator.clone());
    let executor = FakeExecutor::new(0, Duration::from_millis(10));
    let agent = Arc::new(agent(client, executor));
    let tracker_id = agent.tracker().await.id;

    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(agent.clone().run(shutdown.clone()));

    assert_eventually(
        || async {
            let jobs = orchestrator.all_jobs().await;
            jobs.len() == 2 && jobs.iter().all(|j| j.status == JobStatus::Complete)
        },
        Duration::from_secs(5),
        "Both jobs should complete",
    )
    .await;

    let jobs = orchestrator.all_jobs().await;
    assert!(jobs.iter().all(|j| j.owner == Some(tracker_id)));
    assert!(orchestrator
        .tracker_status()
        .await
        .iter()
        .any(|t| t.id == tracker_id));

    shutdown.cancel();
    handle.await.unwrap();
}
