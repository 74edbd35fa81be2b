use tonic::{Request, Response, Status};

use crate::grpc::convert::{job_from_proto, job_to_proto, parse_id, tracker_from_proto};
use crate::orchestrator::Orchestrator;
use crate::proto::tracker_service_server::TrackerService;
use crate::proto::{
    CheckInRequest, CheckInResponse, RequestJobRequest, RequestJobResponse,
    ReturnFinishedJobRequest, ReturnFinishedJobResponse,
};

/// gRPC service trackers use to check in, pull work and hand it back
pub struct TrackerServiceImpl {
    orchestrator: Orchestrator,
}

impl TrackerServiceImpl {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }
}

#[tonic::async_trait]
impl TrackerService for TrackerServiceImpl {
    async fn check_in(
        &self,
        request: Request<CheckInRequest>,
    ) -> Result<Response<CheckInResponse>, Status> {
        let tracker = request
            .into_inner()
            .tracker
            .ok_or_else(|| Status::invalid_argument("Missing tracker"))?;
        let tracker = tracker_from_proto(tracker)?;

        let accepted = self.orchestrator.check_in(tracker).await;
        Ok(Response::new(CheckInResponse { accepted }))
    }

    async fn request_job(
        &self,
        request: Request<RequestJobRequest>,
    ) -> Result<Response<RequestJobResponse>, Status> {
        let tracker_id = parse_id(&request.into_inner().tracker_id)?;

        let job = self.orchestrator.request_job(tracker_id).await;
        tracing::debug!(tracker_id = %tracker_id, assigned = job.is_some(), "RequestJob");

        Ok(Response::new(RequestJobResponse {
            job: job.as_ref().map(job_to_proto),
        }))
    }

    async fn return_finished_job(
        &self,
        request: Request<ReturnFinishedJobRequest>,
    ) -> Result<Response<ReturnFinishedJobResponse>, Status> {
        let job = request
            .into_inner()
            .job
            .ok_or_else(|| Status::invalid_argument("Missing job"))?;
        let job = job_from_proto(job)?;

        self.orchestrator.return_finished_job(job).await;
        Ok(Response::new(ReturnFinishedJobResponse {}))
    }
}
