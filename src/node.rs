use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{OrchestratorConfig, TrackerConfig};
use crate::dashboard::{run_dashboard, DashboardState};
use crate::discovery::{self, DiscoveryResponder};
use crate::error::Result;
use crate::grpc::GrpcServer;
use crate::orchestrator::Orchestrator;
use crate::scheduler::{Scrubber, TrackerRecord};
use crate::worker::{GrpcOrchestratorClient, SimulationExecutor, TrackerAgent};

/// Orchestrator process: registries, scrubber and the network surfaces.
pub struct OrchestratorNode {
    pub config: OrchestratorConfig,
    orchestrator: Orchestrator,
}

impl OrchestratorNode {
    pub fn new(config: OrchestratorConfig) -> Self {
        let orchestrator = Orchestrator::new(config.liveness);
        Self {
            config,
            orchestrator,
        }
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run every orchestrator subsystem until `shutdown` fires.
    ///
    /// 1. Spawns the scrubber
    /// 2. Spawns the discovery responder, when a discovery port is set
    /// 3. Spawns the dashboard, when a dashboard address is set
    /// 4. Runs the gRPC server (blocking)
    ///
    /// # Errors
    ///
    /// Returns an error if the gRPC server fails to start. Discovery and the
    /// dashboard log their own failures without stopping the orchestrator.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let scrubber = Scrubber::new(
            self.orchestrator.trackers().clone(),
            self.config.scrub_interval_ms,
        );
        tokio::spawn(scrubber.run(shutdown.clone()));

        if let Some(port) = self.config.discovery_port {
            let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            match DiscoveryResponder::bind(bind_addr, self.config.listen_addr.port()).await {
                Ok(responder) => {
                    tokio::spawn(responder.run(shutdown.clone()));
                }
                Err(e) => {
                    tracing::warn!(port, error = %e, "Discovery responder disabled");
                }
            }
        }

        if let Some(dashboard_addr) = self.config.dashboard_addr {
            let state = DashboardState {
                orchestrator: self.orchestrator.clone(),
            };
            tokio::spawn(run_dashboard(dashboard_addr, state, shutdown.clone()));
        }

        let liveness = self.config.liveness;
        tracing::info!(
            timeout_ms = liveness.timeout_ms(),
            evict_after_ms = liveness.evict_after_ms(),
            "Orchestrator starting"
        );

        GrpcServer::new(self.config.listen_addr, self.orchestrator)
            .run(shutdown)
            .await?;

        tracing::info!("Orchestrator stopped");
        Ok(())
    }
}

/// Tracker process: locates the orchestrator and runs the agent.
pub struct TrackerNode {
    pub config: TrackerConfig,
}

impl TrackerNode {
    pub fn new(config: TrackerConfig) -> Self {
        Self { config }
    }

    /// Explicit address if configured, otherwise broadcast discovery.
    pub async fn resolve_orchestrator(&self) -> Result<String> {
        if let Some(addr) = &self.config.orchestrator_addr {
            return Ok(addr.clone());
        }

        discovery::discover(
            self.config.discovery_port,
            Duration::from_millis(self.config.discovery_timeout_ms),
            self.config.discovery_attempts,
        )
        .await
    }

    /// # Errors
    ///
    /// Fails only when no orchestrator can be located or its address is
    /// malformed. Once running, transport errors are retried forever.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let addr = self.resolve_orchestrator().await?;
        let client = GrpcOrchestratorClient::connect_lazy(&addr, self.config.rpc_timeout())?;
        let executor = SimulationExecutor::new(self.config.executor.clone());

        let tracker = TrackerRecord::new(self.config.host_label.clone());
        tracing::info!(
            tracker_id = %tracker.id,
            host = %tracker.host_label,
            orchestrator = %addr,
            "Tracker starting"
        );

        let agent = Arc::new(TrackerAgent::new(
            tracker,
            Arc::new(client),
            Arc::new(executor),
            self.config.intervals,
        ));
        agent.run(shutdown).await;
        Ok(())
    }
}
