use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio_stream::StreamExt;
use tonic::transport::Channel;
use tracing_subscriber::EnvFilter;

use simfleet::config::{
    AgentIntervals, ExecutorConfig, LivenessPolicy, OrchestratorConfig, TrackerConfig,
};
use simfleet::grpc::convert::{job_from_proto, job_status_to_proto, job_to_proto, tracker_from_proto};
use simfleet::node::{OrchestratorNode, TrackerNode};
use simfleet::proto::orchestrator_service_client::OrchestratorServiceClient;
use simfleet::proto::{
    CountRequest, GetJobRequest, ListJobsRequest, QueueJobRequest, TrackerStatusRequest,
};
use simfleet::scheduler::{JobRecord, JobStatus, TrackerStatus};
use simfleet::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "simfleet")]
#[command(version)]
#[command(about = "Distributed simulation job queue with pull-based trackers")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the orchestrator
    Orchestrator(OrchestratorArgs),

    /// Run a tracker that pulls and executes jobs
    Tracker(TrackerArgs),

    /// Job management commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },

    /// Fleet status commands
    Cluster {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: ClusterCommands,
    },
}

// =============================================================================
// Orchestrator Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct OrchestratorArgs {
    /// Port to listen on for gRPC
    #[arg(long, default_value = "50051")]
    port: u16,

    /// Port for the web dashboard (optional)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// UDP port answering tracker discovery probes
    #[arg(long, default_value = "50050")]
    discovery_port: u16,

    /// Do not answer discovery probes
    #[arg(long)]
    no_discovery: bool,

    /// Silence after which a tracker is flagged as not responding (min 1000)
    #[arg(long, default_value = "5000")]
    liveness_timeout_ms: u64,

    /// Eviction threshold as a multiple of the liveness timeout (min 2)
    #[arg(long, default_value = "3")]
    evict_multiplier: u32,

    #[arg(long, default_value = "1000")]
    scrub_interval_ms: u64,
}

// =============================================================================
// Tracker Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct TrackerArgs {
    /// Orchestrator address; skips discovery when set
    #[arg(long)]
    orchestrator: Option<String>,

    #[arg(long, default_value = "50050")]
    discovery_port: u16,

    #[arg(long, default_value = "2000")]
    discovery_timeout_ms: u64,

    #[arg(long, default_value = "3")]
    discovery_attempts: u32,

    /// Label reported to the orchestrator (defaults to $HOSTNAME)
    #[arg(long)]
    host_label: Option<String>,

    /// Simulator executable
    #[arg(long)]
    simulator: PathBuf,

    /// Local staging directory
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Simulator output directory inside the staged project
    #[arg(long, default_value = "Outputs")]
    output_dir_name: String,

    /// Prefix of the scenario argument passed to the simulator
    #[arg(long, default_value = "/r:")]
    scenario_flag: String,

    /// Results root for jobs that carry no results location
    #[arg(long)]
    results_root: Option<PathBuf>,

    #[arg(long, default_value = "1000")]
    heartbeat_ms: u64,

    #[arg(long, default_value = "1000")]
    poll_ms: u64,

    /// Poll delay while the orchestrator is unreachable
    #[arg(long, default_value = "5000")]
    backoff_ms: u64,

    #[arg(long, default_value = "10000")]
    rpc_timeout_ms: u64,
}

// =============================================================================
// Client Arguments (shared by job and cluster commands)
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Orchestrator address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:50051")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StatusFilter {
    Queued,
    Running,
    Complete,
    Failed,
}

impl From<StatusFilter> for JobStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Queued => JobStatus::Queued,
            StatusFilter::Running => JobStatus::Running,
            StatusFilter::Complete => JobStatus::Complete,
            StatusFilter::Failed => JobStatus::Failed,
        }
    }
}

// =============================================================================
// Job Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Submit a new simulation job
    Submit {
        /// Project file, relative to the source location
        project_file: String,

        /// Directory holding the project
        #[arg(long)]
        source: String,

        /// Directory results are copied into
        #[arg(long, default_value = "")]
        results: String,

        /// Friendly name; the job id is used when omitted
        #[arg(long)]
        name: Option<String>,

        /// Scenario indices, comma-separated. Omit or pass 0 to run all
        #[arg(long, value_delimiter = ',')]
        scenarios: Vec<i32>,
    },
    /// Get status of a specific job
    Status {
        /// The job ID (UUID)
        job_id: String,
    },
    /// List all jobs
    List {
        /// Only list jobs in this state
        #[arg(long)]
        status: Option<StatusFilter>,
    },
}

// =============================================================================
// Cluster Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum ClusterCommands {
    /// Show trackers bucketed by status and the queue depth
    Status,
}

// =============================================================================
// JSON Output Types
// =============================================================================

#[derive(Serialize)]
struct JobSubmitOutput {
    job_id: String,
    queued: bool,
}

#[derive(Serialize)]
struct TrackerOutput {
    tracker_id: String,
    host_label: String,
    status: String,
    last_checkin: Option<DateTime<Utc>>,
    current_job: Option<String>,
}

#[derive(Serialize)]
struct ClusterStatusOutput {
    waiting_jobs: u32,
    idle: Vec<TrackerOutput>,
    running: Vec<TrackerOutput>,
    no_response: Vec<TrackerOutput>,
    unknown: Vec<TrackerOutput>,
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn create_client(
    args: &ClientArgs,
) -> Result<OrchestratorServiceClient<Channel>, Box<dyn std::error::Error>> {
    let channel = Channel::from_shared(args.addr.clone())?
        .connect_timeout(Duration::from_secs(5))
        .connect()
        .await?;
    Ok(OrchestratorServiceClient::new(channel))
}

fn format_time(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

// =============================================================================
// Process Implementations
// =============================================================================

async fn run_orchestrator(args: OrchestratorArgs) -> Result<(), Box<dyn std::error::Error>> {
    let listen_addr: SocketAddr = format!("0.0.0.0:{}", args.port).parse()?;
    let dashboard_addr: Option<SocketAddr> = match args.dashboard_port {
        Some(p) => Some(format!("0.0.0.0:{}", p).parse()?),
        None => None,
    };

    let mut config = OrchestratorConfig::new(listen_addr).with_liveness(LivenessPolicy::new(
        args.liveness_timeout_ms,
        args.evict_multiplier,
    ));
    config.dashboard_addr = dashboard_addr;
    config.scrub_interval_ms = args.scrub_interval_ms;
    config.discovery_port = Some(args.discovery_port);
    if args.no_discovery {
        config = config.without_discovery();
    }

    tracing::info!(
        listen_addr = %config.listen_addr,
        dashboard_addr = ?config.dashboard_addr,
        discovery_port = ?config.discovery_port,
        "Starting simfleet orchestrator"
    );

    let shutdown = install_shutdown_handler();
    OrchestratorNode::new(config).run(shutdown).await?;
    Ok(())
}

async fn run_tracker(args: TrackerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let defaults = ExecutorConfig::default();
    let executor = ExecutorConfig {
        simulator_path: args.simulator,
        work_dir: args.work_dir.unwrap_or(defaults.work_dir),
        output_dir_name: args.output_dir_name,
        scenario_flag: args.scenario_flag,
        default_results_root: args.results_root,
    };

    let host_label = args
        .host_label
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string());

    let config = TrackerConfig {
        orchestrator_addr: args.orchestrator,
        discovery_port: args.discovery_port,
        discovery_timeout_ms: args.discovery_timeout_ms,
        discovery_attempts: args.discovery_attempts,
        host_label,
        intervals: AgentIntervals {
            heartbeat: Duration::from_millis(args.heartbeat_ms),
            poll: Duration::from_millis(args.poll_ms),
            backoff: Duration::from_millis(args.backoff_ms),
        },
        rpc_timeout_ms: args.rpc_timeout_ms,
        executor,
    };

    let shutdown = install_shutdown_handler();
    TrackerNode::new(config).run(shutdown).await?;
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

async fn handle_job_submit(
    client: &mut OrchestratorServiceClient<Channel>,
    job: JobRecord,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let job_id = job.id;
    let response = client
        .queue_job(QueueJobRequest {
            job: Some(job_to_proto(&job)),
        })
        .await;

    match response {
        Ok(response) => {
            let queued = response.into_inner().queued;
            match output_format {
                OutputFormat::Json => {
                    let output = JobSubmitOutput {
                        job_id: job_id.to_string(),
                        queued,
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                OutputFormat::Table => {
                    println!("Job submitted successfully!");
                    println!("Job ID: {}", job_id);
                }
            }
        }
        Err(status) => {
            eprintln!("Error: Job submission failed: {}", status.message());
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn handle_job_status(
    client: &mut OrchestratorServiceClient<Channel>,
    job_id: String,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let response = client
        .get_job(GetJobRequest { job_id })
        .await?
        .into_inner();

    let Some(job) = response.job else {
        eprintln!("Error: Job not found");
        std::process::exit(1);
    };
    let job = job_from_proto(job)?;

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&job)?);
        }
        OutputFormat::Table => {
            println!("Job ID:     {}", job.id);
            println!("Name:       {}", job.display_name());
            println!("Status:     {}", job.status);
            println!("Project:    {}", job.project_file);
            println!("Source:     {}", job.source_location);
            println!("Results:    {}", job.results_location);
            if !job.runs_all_scenarios() {
                println!("Scenarios:  {:?}", job.scenarios);
            }
            if let Some(owner) = job.owner {
                println!("Tracker:    {}", owner);
            }
            if let Some(exit_code) = job.exit_code {
                println!("Exit Code:  {}", exit_code);
            }
            println!("Submitted:  {}", format_time(job.submit_time));
            println!("Started:    {}", format_time(job.start_time));
            println!("Finished:   {}", format_time(job.finish_time));
        }
    }
    Ok(())
}

async fn handle_job_list(
    client: &mut OrchestratorServiceClient<Channel>,
    status: Option<StatusFilter>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let status_filter = status
        .map(|s| job_status_to_proto(s.into()) as i32)
        .unwrap_or_default();

    let mut job_stream = client
        .list_jobs(ListJobsRequest { status_filter })
        .await?
        .into_inner();

    let mut jobs: Vec<JobRecord> = Vec::new();
    while let Some(result) = job_stream.next().await {
        match result {
            Ok(job) => jobs.push(job_from_proto(job)?),
            Err(e) => {
                eprintln!("Stream error: {}", e);
                break;
            }
        }
    }

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&jobs)?);
        }
        OutputFormat::Table => {
            if jobs.is_empty() {
                println!("No jobs found.");
            } else {
                println!(
                    "{:<38} {:<10} {:<20} {:<5} NAME",
                    "JOB ID", "STATUS", "SUBMITTED", "EXIT"
                );
                println!("{}", "-".repeat(90));

                for job in &jobs {
                    let exit = job
                        .exit_code
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string());
                    let mut name = job.display_name();
                    if name.chars().count() > 24 {
                        name = format!("{}...", name.chars().take(21).collect::<String>());
                    }
                    println!(
                        "{:<38} {:<10} {:<20} {:<5} {}",
                        job.id,
                        job.status,
                        format_time(job.submit_time),
                        exit,
                        name
                    );
                }
                println!();
                println!("{} job(s)", jobs.len());
            }
        }
    }
    Ok(())
}

async fn handle_cluster_status(
    client: &mut OrchestratorServiceClient<Channel>,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let waiting_jobs = client
        .num_waiting_jobs(CountRequest {})
        .await?
        .into_inner()
        .count;
    let response = client
        .tracker_status(TrackerStatusRequest {})
        .await?
        .into_inner();

    let mut output = ClusterStatusOutput {
        waiting_jobs,
        idle: Vec::new(),
        running: Vec::new(),
        no_response: Vec::new(),
        unknown: Vec::new(),
    };

    for tracker in response.trackers {
        let tracker = tracker_from_proto(tracker)?;
        let bucket = match tracker.status {
            TrackerStatus::Idle => &mut output.idle,
            TrackerStatus::Running => &mut output.running,
            TrackerStatus::NoResponse => &mut output.no_response,
            TrackerStatus::Unknown => &mut output.unknown,
        };
        bucket.push(TrackerOutput {
            tracker_id: tracker.id.to_string(),
            host_label: tracker.host_label,
            status: tracker.status.to_string(),
            last_checkin: tracker.last_checkin,
            current_job: tracker.current_job.map(|id| id.to_string()),
        });
    }

    match output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Fleet Status");
            println!("{}", "=".repeat(40));
            println!("Waiting jobs:     {}", output.waiting_jobs);
            println!("Idle trackers:    {}", output.idle.len());
            println!("Running trackers: {}", output.running.len());
            println!("Not responding:   {}", output.no_response.len());
            println!();

            let buckets = [
                &output.running,
                &output.idle,
                &output.no_response,
                &output.unknown,
            ];
            if buckets.iter().all(|b| b.is_empty()) {
                println!("No trackers registered.");
                return Ok(());
            }

            println!("{:<38} {:<20} {:<12} JOB", "TRACKER ID", "HOST", "STATUS");
            println!("{}", "-".repeat(90));
            for tracker in buckets.into_iter().flatten() {
                println!(
                    "{:<38} {:<20} {:<12} {}",
                    tracker.tracker_id,
                    tracker.host_label,
                    tracker.status,
                    tracker.current_job.as_deref().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

// =============================================================================
// Main Entry Point
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_logging();

    match args.command {
        Commands::Orchestrator(orchestrator_args) => {
            run_orchestrator(orchestrator_args).await?;
        }
        Commands::Tracker(tracker_args) => {
            run_tracker(tracker_args).await?;
        }
        Commands::Job { client, command } => {
            let mut grpc_client = create_client(&client).await?;

            match command {
                JobCommands::Submit {
                    project_file,
                    source,
                    results,
                    name,
                    scenarios,
                } => {
                    let mut job = JobRecord::new(project_file, source, results)
                        .with_scenarios(scenarios);
                    if let Some(name) = name {
                        job = job.with_name(name);
                    }
                    job.submit_time = Some(Utc::now());
                    handle_job_submit(&mut grpc_client, job, &client.output).await?;
                }
                JobCommands::Status { job_id } => {
                    handle_job_status(&mut grpc_client, job_id, &client.output).await?;
                }
                JobCommands::List { status } => {
                    handle_job_list(&mut grpc_client, status, &client.output).await?;
                }
            }
        }
        Commands::Cluster { client, command } => {
            let mut grpc_client = create_client(&client).await?;

            match command {
                ClusterCommands::Status => {
                    handle_cluster_status(&mut grpc_client, &client.output).await?;
                }
            }
        }
    }

    Ok(())
}
