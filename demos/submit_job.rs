use std::time::Duration;

use clap::Parser;
use simfleet::grpc::convert::{job_from_proto, job_to_proto};
use simfleet::proto::orchestrator_service_client::OrchestratorServiceClient;
use simfleet::proto::{GetJobRequest, QueueJobRequest};
use simfleet::scheduler::JobRecord;

/// Submit one simulation job and poll until it finishes.
#[derive(Parser, Debug)]
#[command(name = "submit-job")]
#[command(about = "Submit a job to a simfleet orchestrator and wait for it")]
struct Args {
    /// Orchestrator address
    #[arg(long, default_value = "http://127.0.0.1:50051")]
    addr: String,

    /// Project file, relative to the source directory
    #[arg(long)]
    project: String,

    /// Source directory
    #[arg(long)]
    source: String,

    /// Results directory
    #[arg(long, default_value = "")]
    results: String,

    #[arg(long)]
    name: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long, default_value = "2000")]
    poll_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut client = OrchestratorServiceClient::connect(args.addr.clone()).await?;

    let mut job = JobRecord::new(args.project, args.source, args.results);
    if let Some(name) = args.name {
        job = job.with_name(name);
    }
    job.submit_time = Some(chrono::Utc::now());
    let job_id = job.id;

    client
        .queue_job(QueueJobRequest {
            job: Some(job_to_proto(&job)),
        })
        .await?;
    println!("Submitted {} ({})", job.display_name(), job_id);

    let mut last_status = None;
    loop {
        tokio::time::sleep(Duration::from_millis(args.poll_ms)).await;

        let response = client
            .get_job(GetJobRequest {
                job_id: job_id.to_string(),
            })
            .await?
            .into_inner();
        let Some(job) = response.job else {
            continue;
        };
        let job = job_from_proto(job)?;

        if last_status != Some(job.status) {
            println!("Status: {}", job.status);
            last_status = Some(job.status);
        }

        if job.status.is_terminal() {
            if let Some(exit_code) = job.exit_code {
                println!("Exit code: {}", exit_code);
            }
            break;
        }
    }

    Ok(())
}
