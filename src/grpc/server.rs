use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tonic::transport::Server;

use crate::grpc::orchestrator_service::OrchestratorServiceImpl;
use crate::grpc::tracker_service::TrackerServiceImpl;
use crate::orchestrator::Orchestrator;
use crate::proto::orchestrator_service_server::OrchestratorServiceServer;
use crate::proto::tracker_service_server::TrackerServiceServer;

pub struct GrpcServer {
    addr: SocketAddr,
    orchestrator: Orchestrator,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, orchestrator: Orchestrator) -> Self {
        Self { addr, orchestrator }
    }

    /// Serve both services until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), tonic::transport::Error> {
        let tracker_service = TrackerServiceImpl::new(self.orchestrator.clone());
        let orchestrator_service = OrchestratorServiceImpl::new(self.orchestrator);

        tracing::info!(addr = %self.addr, "Starting gRPC server");

        Server::builder()
            .add_service(TrackerServiceServer::new(tracker_service))
            .add_service(OrchestratorServiceServer::new(orchestrator_service))
            .serve_with_shutdown(self.addr, shutdown.cancelled_owned())
            .await
    }
}
