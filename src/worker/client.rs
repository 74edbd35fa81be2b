use std::time::Duration;

use tonic::transport::{Channel, Endpoint};

use crate::error::{FleetError, Result};
use crate::grpc::convert::{job_from_proto, job_to_proto, tracker_to_proto};
use crate::orchestrator::Orchestrator;
use crate::proto::tracker_service_client::TrackerServiceClient;
use crate::proto::{CheckInRequest, RequestJobRequest, ReturnFinishedJobRequest};
use crate::scheduler::{JobRecord, TrackerRecord};

/// The three orchestrator calls a tracker makes.
///
/// Errors for which [`FleetError::is_unreachable`] holds are retried by the
/// agent; anything else is logged and treated the same way, since the agent
/// never gives up on the orchestrator.
#[tonic::async_trait]
pub trait OrchestratorClient: Send + Sync {
    async fn check_in(&self, tracker: &TrackerRecord) -> Result<bool>;

    /// `Ok(None)` when no job is waiting.
    async fn request_job(&self, tracker: &TrackerRecord) -> Result<Option<JobRecord>>;

    async fn return_finished_job(&self, job: &JobRecord) -> Result<()>;
}

/// Orchestrator reached over gRPC.
#[derive(Clone)]
pub struct GrpcOrchestratorClient {
    client: TrackerServiceClient<Channel>,
}

impl GrpcOrchestratorClient {
    /// Build a lazily-connected client. Nothing is dialled until the first
    /// call, so an orchestrator that is down at startup only shows up as
    /// unreachable calls later.
    pub fn connect_lazy(addr: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Endpoint::from_shared(addr.to_string())
            .map_err(|e| FleetError::Config(format!("Invalid orchestrator address {}: {}", addr, e)))?
            .connect_timeout(timeout)
            .timeout(timeout);

        Ok(Self {
            client: TrackerServiceClient::new(endpoint.connect_lazy()),
        })
    }
}

#[tonic::async_trait]
impl OrchestratorClient for GrpcOrchestratorClient {
    async fn check_in(&self, tracker: &TrackerRecord) -> Result<bool> {
        let response = self
            .client
            .clone()
            .check_in(CheckInRequest {
                tracker: Some(tracker_to_proto(tracker)),
            })
            .await?;
        Ok(response.into_inner().accepted)
    }

    async fn request_job(&self, tracker: &TrackerRecord) -> Result<Option<JobRecord>> {
        let response = self
            .client
            .clone()
            .request_job(RequestJobRequest {
                tracker_id: tracker.id.to_string(),
            })
            .await?;

        response.into_inner().job.map(job_from_proto).transpose()
    }

    async fn return_finished_job(&self, job: &JobRecord) -> Result<()> {
        self.client
            .clone()
            .return_finished_job(ReturnFinishedJobRequest {
                job: Some(job_to_proto(job)),
            })
            .await?;
        Ok(())
    }
}

/// In-process orchestrator, for running a tracker inside the orchestrator
/// process and for tests.
#[tonic::async_trait]
impl OrchestratorClient for Orchestrator {
    async fn check_in(&self, tracker: &TrackerRecord) -> Result<bool> {
        Ok(Orchestrator::check_in(self, tracker.clone()).await)
    }

    async fn request_job(&self, tracker: &TrackerRecord) -> Result<Option<JobRecord>> {
        Ok(Orchestrator::request_job(self, tracker.id).await)
    }

    async fn return_finished_job(&self, job: &JobRecord) -> Result<()> {
        Orchestrator::return_finished_job(self, job.clone()).await;
        Ok(())
    }
}
