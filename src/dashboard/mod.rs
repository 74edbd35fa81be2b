use std::net::SocketAddr;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::orchestrator::Orchestrator;
use crate::scheduler::{JobRecord, TrackerRecord};

#[derive(Clone)]
pub struct DashboardState {
    pub orchestrator: Orchestrator,
}

#[derive(Debug, Serialize)]
struct SummaryResponse {
    waiting_jobs: usize,
    idle_trackers: usize,
    running_trackers: usize,
}

#[derive(Debug, Serialize)]
struct TrackerResponse {
    id: String,
    host_label: String,
    status: String,
    last_checkin: Option<String>,
    current_job: Option<String>,
}

impl From<TrackerRecord> for TrackerResponse {
    fn from(tracker: TrackerRecord) -> Self {
        Self {
            id: tracker.id.to_string(),
            host_label: tracker.host_label,
            status: tracker.status.to_string(),
            last_checkin: tracker.last_checkin.map(|t| t.to_rfc3339()),
            current_job: tracker.current_job.map(|id| id.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct JobResponse {
    id: String,
    name: String,
    project_file: String,
    status: String,
    owner: Option<String>,
    exit_code: Option<i32>,
    submit_time: Option<String>,
    start_time: Option<String>,
    finish_time: Option<String>,
}

impl From<JobRecord> for JobResponse {
    fn from(job: JobRecord) -> Self {
        Self {
            id: job.id.to_string(),
            name: job.display_name(),
            status: job.status.to_string(),
            owner: job.owner.map(|id| id.to_string()),
            exit_code: job.exit_code,
            submit_time: job.submit_time.map(|t| t.to_rfc3339()),
            start_time: job.start_time.map(|t| t.to_rfc3339()),
            finish_time: job.finish_time.map(|t| t.to_rfc3339()),
            project_file: job.project_file,
        }
    }
}

/// Dashboard routes, without binding a listener.
pub fn router(state: DashboardState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/summary", get(summary_handler))
        .route("/api/trackers", get(list_trackers_handler))
        .route("/api/jobs", get(list_jobs_handler))
        .route("/api/jobs/:id", get(get_job_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn run_dashboard(addr: SocketAddr, state: DashboardState, shutdown: CancellationToken) {
    tracing::info!(addr = %addr, "Starting dashboard server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind dashboard server");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "Dashboard server failed");
    }
}

async fn summary_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let orchestrator = &state.orchestrator;
    Json(SummaryResponse {
        waiting_jobs: orchestrator.num_waiting_jobs().await,
        idle_trackers: orchestrator.num_idle_trackers(),
        running_trackers: orchestrator.num_running_trackers(),
    })
}

async fn list_trackers_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let trackers: Vec<TrackerResponse> = state
        .orchestrator
        .tracker_status()
        .await
        .into_iter()
        .map(TrackerResponse::from)
        .collect();

    Json(trackers)
}

async fn list_jobs_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let jobs: Vec<JobResponse> = state
        .orchestrator
        .all_jobs()
        .await
        .into_iter()
        .map(JobResponse::from)
        .collect();

    Json(jobs)
}

async fn get_job_handler(
    State(state): State<DashboardState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let Ok(job_id) = Uuid::parse_str(&id) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    match state.orchestrator.job(&job_id).await {
        Some(job) => Json(JobResponse::from(job)).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
