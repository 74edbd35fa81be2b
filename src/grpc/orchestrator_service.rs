use std::pin::Pin;

use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::grpc::convert::{
    job_from_proto, job_status_from_proto, job_to_proto, parse_id, tracker_to_proto,
};
use crate::orchestrator::Orchestrator;
use crate::proto::orchestrator_service_server::OrchestratorService;
use crate::proto::{
    CountRequest, CountResponse, GetJobRequest, GetJobResponse, Job, ListJobsRequest, PingRequest,
    PingResponse, QueueJobRequest, QueueJobResponse, TrackerStatusRequest, TrackerStatusResponse,
};

/// gRPC service for client-facing API
pub struct OrchestratorServiceImpl {
    orchestrator: Orchestrator,
}

impl OrchestratorServiceImpl {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

type JobStream = Pin<Box<dyn tokio_stream::Stream<Item = Result<Job, Status>> + Send>>;

fn count(n: usize) -> Response<CountResponse> {
    Response::new(CountResponse {
        count: u32::try_from(n).unwrap_or(u32::MAX),
    })
}

#[tonic::async_trait]
impl OrchestratorService for OrchestratorServiceImpl {
    type ListJobsStream = JobStream;

    async fn queue_job(
        &self,
        request: Request<QueueJobRequest>,
    ) -> Result<Response<QueueJobResponse>, Status> {
        let job = request
            .into_inner()
            .job
            .ok_or_else(|| Status::invalid_argument("Missing job"))?;

        if job.project_file.trim().is_empty() {
            return Err(Status::invalid_argument("Project file cannot be empty"));
        }

        let job = job_from_proto(job)?;
        tracing::info!(job_id = %job.id, name = %job.display_name(), "Queueing new job");

        let job_id = job.id;
        if !self.orchestrator.queue_job(job).await {
            return Err(Status::already_exists(format!("Job {} already exists", job_id)));
        }
        Ok(Response::new(QueueJobResponse { queued: true }))
    }

    async fn tracker_status(
        &self,
        _request: Request<TrackerStatusRequest>,
    ) -> Result<Response<TrackerStatusResponse>, Status> {
        tracing::debug!("Tracker status requested");
        let trackers = self
            .orchestrator
            .tracker_status()
            .await
            .iter()
            .map(tracker_to_proto)
            .collect();

        Ok(Response::new(TrackerStatusResponse { trackers }))
    }

    async fn list_jobs(
        &self,
        request: Request<ListJobsRequest>,
    ) -> Result<Response<Self::ListJobsStream>, Status> {
        let status_filter = job_status_from_proto(request.into_inner().status_filter);
        let jobs = self.orchestrator.all_jobs().await;

        let (tx, rx) = tokio::sync::mpsc::channel(32);

        tokio::spawn(async move {
            for job in jobs {
                if status_filter.is_some_and(|filter| filter != job.status) {
                    continue;
                }

                if tx.send(Ok(job_to_proto(&job))).await.is_err() {
                    // Client disconnected
                    break;
                }
            }
        });

        let stream = ReceiverStream::new(rx);
        Ok(Response::new(Box::pin(stream) as Self::ListJobsStream))
    }

    async fn get_job(
        &self,
        request: Request<GetJobRequest>,
    ) -> Result<Response<GetJobResponse>, Status> {
        let job_id = parse_id(&request.into_inner().job_id)?;

        let job = self
            .orchestrator
            .job(&job_id)
            .await
            .ok_or_else(|| Status::not_found("Job not found"))?;

        Ok(Response::new(GetJobResponse {
            job: Some(job_to_proto(&job)),
        }))
    }

    async fn num_waiting_jobs(
        &self,
        _request: Request<CountRequest>,
    ) -> Result<Response<CountResponse>, Status> {
        Ok(count(self.orchestrator.num_waiting_jobs().await))
    }

    async fn num_idle_trackers(
        &self,
        _request: Request<CountRequest>,
    ) -> Result<Response<CountResponse>, Status> {
        Ok(count(self.orchestrator.num_idle_trackers()))
    }

    async fn num_running_trackers(
        &self,
        _request: Request<CountRequest>,
    ) -> Result<Response<CountResponse>, Status> {
        Ok(count(self.orchestrator.num_running_trackers()))
    }

    async fn ping(&self, _request: Request<PingRequest>) -> Result<Response<PingResponse>, Status> {
        Ok(Response::new(PingResponse {
            alive: self.orchestrator.ping(),
        }))
    }
}
