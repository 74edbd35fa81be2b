//! Both gRPC services against a live server on localhost.


use std::time::Duration;

use chrono::Utc;
use simfleet::grpc::convert::{job_from_proto, job_status_to_proto, job_to_proto};
use simfleet::proto::{
    CountRequest, GetJobRequest, ListJobsRequest, PingRequest, QueueJobRequest,
    TrackerStatusRequest,
};
use simfleet::scheduler::{JobRecord, JobStatus, TrackerRecord};
use simfleet::worker::{GrpcOrchestratorClient, OrchestratorClient};
use test_harness::TestOrchestrator;
use tokio_stream::StreamExt;

fn job(name: &str) -> JobRecord {
    JobRecord::new("model.envx", "/projects/src", "/projects/results")
        .with_name(name)
        .with_scenarios(vec![2, 4])
}

#[tokio::test]
async fn test_queue_request_and_return_round_trip() {
    let node = TestOrchestrator::start(50310).await;
    let mut client = node.client().await;
    let tracker_client =
        GrpcOrchestratorClient::connect_lazy(&node.endpoint(), Duration::from_secs(2)).unwrap();

    let submitted = job("J1");
    let queued = client
        .queue_job(QueueJobRequest {
            job: Some(job_to_proto(&submitted)),
        })
        .await
        .unwrap()
        .into_inner()
        .queued;
    assert!(queued);

    let waiting = client.num_waiting_jobs(CountRequest {}).await.unwrap();
    assert_eq!(waiting.into_inner().count, 1);

    let mut tracker = TrackerRecord::new("node-1");
    tracker.set_idle();
    assert!(tracker_client.check_in(&tracker).await.unwrap());

    let acquired = tracker_client.request_job(&tracker).await.unwrap().unwrap();
    assert_eq!(acquired.id, submitted.id);
    assert_eq!(acquired.status, JobStatus::Running);
    assert_eq!(acquired.owner, Some(tracker.id));
    assert_eq!(acquired.scenarios, vec![2, 4]);
    assert_eq!(acquired.display_name(), "J1");
    assert!(tracker_client.request_job(&tracker).await.unwrap().is_none());

    let mut done = acquired;
    done.finish(0, Utc::now());
    tracker_client.return_finished_job(&done).await.unwrap();
    tracker_client.return_finished_job(&done).await.unwrap();

    let mut stream = client
        .list_jobs(ListJobsRequest { status_filter: 0 })
        .await
        .unwrap()
        .into_inner();
    let mut listed = Vec::new();
    while let Some(job) = stream.next().await {
        listed.push(job_from_proto(job.unwrap()).unwrap());
    }
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, submitted.id);
    assert_eq!(listed[0].status, JobStatus::Complete);
    assert_eq!(listed[0].exit_code, Some(0));

    node.shutdown().await;
}

#[tokio::test]
async fn test_list_jobs_filters_by_status() {
    let node = TestOrchestrator::start(50311).await;
    let mut client = node.client().await;

    for name in ["a", "b", "c"] {
        node.orchestrator.queue_job(job(name)).await;
    }
    node.orchestrator
        .request_job(uuid::Uuid::new_v4())
        .await
        .unwrap();

    let running = job_status_to_proto(JobStatus::Running) as i32;
    let mut stream = client
        .list_jobs(ListJobsRequest {
            status_filter: running,
        })
        .await
        .unwrap()
        .into_inner();
    let mut count = 0;
    while let Some(job) = stream.next().await {
        assert_eq!(job.unwrap().status, running);
        count += 1;
    }
    assert_eq!(count, 1);

    node.shutdown().await;
}

#[tokio::test]
async fn test_get_job_errors() {
    let node = TestOrchestrator::start(50312).await;
    let mut client = node.client().await;

    let missing = client
        .get_job(GetJobRequest {
            job_id: uuid::Uuid::new_v4().to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(missing.code(), tonic::Code::NotFound);

    let malformed = client
        .get_job(GetJobRequest {
            job_id: "not-a-uuid".to_string(),
        })
        .await
        .unwrap_err();
    assert_eq!(malformed.code(), tonic::Code::InvalidArgument);

    let empty_project = client
        .queue_job(QueueJobRequest {
            job: Some(job_to_proto(&JobRecord::new("  ", "/src", "/results"))),
        })
        .await
        .unwrap_err();
    assert_eq!(empty_project.code(), tonic::Code::InvalidArgument);

    let submitted = job("once");
    client
        .queue_job(QueueJobRequest {
            job: Some(job_to_proto(&submitted)),
        })
        .await
        .unwrap();
    let duplicate = client
        .queue_job(QueueJobRequest {
            job: Some(job_to_proto(&submitted)),
        })
        .await
        .unwrap_err();
    assert_eq!(duplicate.code(), tonic::Code::AlreadyExists);
    assert_eq!(node.orchestrator.num_waiting_jobs().await, 1);

    node.shutdown().await;
}

#[tokio::test]
async fn test_status_counters_and_ping() {
    let node = TestOrchestrator::start(50313).await;
    let mut client = node.client().await;
    let tracker_client =
        GrpcOrchestratorClient::connect_lazy(&node.endpoint(), Duration::from_secs(2)).unwrap();

    let mut idle = TrackerRecord::new("node-a");
    idle.set_idle();
    let mut busy = TrackerRecord::new("node-b");
    busy.set_running(uuid::Uuid::new_v4());
    tracker_client.check_in(&idle).await.unwrap();
    tracker_client.check_in(&busy).await.unwrap();
    node.orchestrator.trackers().scrub().await;

    let trackers = client
        .tracker_status(TrackerStatusRequest {})
        .await
        .unwrap()
        .into_inner()
        .trackers;
    assert_eq!(trackers.len(), 2);
    assert_eq!(trackers[0].host_label, "node-a");
    assert!(trackers.iter().all(|t| t.last_checkin_ms > 0));

    let idle_count = client.num_idle_trackers(CountRequest {}).await.unwrap();
    let running_count = client.num_running_trackers(CountRequest {}).await.unwrap();
    assert_eq!(idle_count.into_inner().count, 1);
    assert_eq!(running_count.into_inner().count, 1);

    let ping = client.ping(PingRequest {}).await.unwrap();
    assert!(ping.into_inner().alive);

    node.shutdown().await;
}

#[tokio::test]
async fn test_unreachable_orchestrator_is_reported_as_such() {
    // Nothing listens on this port
    let client =
        GrpcOrchestratorClient::connect_lazy("http://127.0.0.1:50319", Duration::from_millis(500))
            .unwrap();
    let tracker = TrackerRecord::new("node-1");

    let err = client.request_job(&tracker).await.unwrap_err();
    assert!(err.is_unreachable(), "unexpected error: {:?}", err);

    let err = client.check_in(&tracker).await.unwrap_err();
    assert!(err.is_unreachable(), "unexpected error: {:?}", err);
}

#[tokio::test]
async fn test_invalid_orchestrator_address() {
    let result = GrpcOrchestratorClient::connect_lazy("not a uri", Duration::from_secs(1));
    assert!(result.is_err());
}
