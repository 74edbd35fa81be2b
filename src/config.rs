use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Smallest liveness timeout the orchestrator accepts.
pub const MIN_LIVENESS_TIMEOUT_MS: u64 = 1000;

/// Two-stage tracker liveness thresholds.
///
/// A tracker silent for `timeout` is flagged `NoResponse`; one silent for
/// `timeout * evict_multiplier` is evicted and its job requeued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivenessPolicy {
    timeout_ms: u64,
    evict_multiplier: u32,
}

impl Default for LivenessPolicy {
    fn default() -> Self {
        Self::new(5000, 3)
    }
}

impl LivenessPolicy {
    /// Values below the minimums are clamped up: the timeout to 1000 ms and the
    /// multiplier to 2, so flagging always happens before eviction.
    pub fn new(timeout_ms: u64, evict_multiplier: u32) -> Self {
        Self {
            timeout_ms: timeout_ms.max(MIN_LIVENESS_TIMEOUT_MS),
            evict_multiplier: evict_multiplier.max(2),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_ms
    }

    pub fn evict_after_ms(&self) -> u64 {
        self.timeout_ms * u64::from(self.evict_multiplier)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub listen_addr: SocketAddr,
    pub dashboard_addr: Option<SocketAddr>,
    /// UDP port the discovery responder listens on. `None` disables discovery.
    pub discovery_port: Option<u16>,
    pub liveness: LivenessPolicy,
    pub scrub_interval_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 50051)),
            dashboard_addr: None,
            discovery_port: Some(50050),
            liveness: LivenessPolicy::default(),
            scrub_interval_ms: 1000,
        }
    }
}

impl OrchestratorConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }

    pub fn with_liveness(mut self, liveness: LivenessPolicy) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn without_discovery(mut self) -> Self {
        self.discovery_port = None;
        self
    }
}

/// Timer periods for the tracker agent's two activities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentIntervals {
    pub heartbeat: Duration,
    /// Delay before the next job request after an empty answer.
    pub poll: Duration,
    /// Delay before the next job request after the orchestrator was unreachable.
    pub backoff: Duration,
}

impl Default for AgentIntervals {
    fn default() -> Self {
        Self {
            heartbeat: Duration::from_millis(1000),
            poll: Duration::from_millis(1000),
            backoff: Duration::from_millis(5000),
        }
    }
}

/// Settings for the simulation-binary executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Path to the simulator executable.
    pub simulator_path: PathBuf,
    /// Local directory jobs are staged under, one subdirectory per job id.
    pub work_dir: PathBuf,
    /// Directory the simulator writes its results into, relative to the
    /// staged project.
    pub output_dir_name: String,
    /// Prefix for the scenario argument, e.g. `/r:` gives `/r:3`.
    pub scenario_flag: String,
    /// Used when a job carries no results location.
    pub default_results_root: Option<PathBuf>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            simulator_path: PathBuf::from("simulator"),
            work_dir: std::env::temp_dir().join("simfleet"),
            output_dir_name: "Outputs".to_string(),
            scenario_flag: "/r:".to_string(),
            default_results_root: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Explicit orchestrator endpoint (`http://host:port`). Skips discovery.
    pub orchestrator_addr: Option<String>,
    pub discovery_port: u16,
    pub discovery_timeout_ms: u64,
    pub discovery_attempts: u32,
    pub host_label: String,
    pub intervals: AgentIntervals,
    /// Upper bound on any single call to the orchestrator.
    pub rpc_timeout_ms: u64,
    pub executor: ExecutorConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            orchestrator_addr: None,
            discovery_port: 50050,
            discovery_timeout_ms: 2000,
            discovery_attempts: 3,
            host_label: "localhost".to_string(),
            intervals: AgentIntervals::default(),
            rpc_timeout_ms: 10_000,
            executor: ExecutorConfig::default(),
        }
    }
}

impl TrackerConfig {
    pub fn with_orchestrator(mut self, addr: impl Into<String>) -> Self {
        self.orchestrator_addr = Some(addr.into());
        self
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}
