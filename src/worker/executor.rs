use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::ExecutorConfig;
use crate::error::{FleetError, Result};
use crate::scheduler::{JobRecord, JobStatus};

/// Exit code reported when the job never got as far as a simulator exit.
pub const EXECUTION_FAILED_EXIT_CODE: i32 = -1;

/// Result of job execution
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub exit_code: i32,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn from_exit_code(job_id: Uuid, exit_code: i32, error: Option<String>) -> Self {
        Self {
            job_id,
            status: JobStatus::from_exit_code(exit_code),
            exit_code,
            error,
        }
    }

    pub fn failed(job_id: Uuid, error: impl Into<String>) -> Self {
        Self::from_exit_code(job_id, EXECUTION_FAILED_EXIT_CODE, Some(error.into()))
    }
}

/// Runs one job to completion. The agent holds at most one job in flight,
/// so implementations never see concurrent calls from the same tracker.
#[tonic::async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &JobRecord) -> ExecutionResult;
}

/// Executes jobs by running the simulator binary once per scenario.
///
/// For each job the source location is copied into `work_dir/<job id>`, the
/// simulator is run against the staged project file, and its output directory
/// is copied to the results location after every scenario.
#[derive(Debug, Clone)]
pub struct SimulationExecutor {
    config: ExecutorConfig,
}

impl SimulationExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn job_dir(&self, job: &JobRecord) -> PathBuf {
        self.config.work_dir.join(job.id.to_string())
    }

    /// Where results for `job` end up: `<results location>/<display name>`,
    /// falling back to the configured default root.
    pub fn results_dir(&self, job: &JobRecord) -> Option<PathBuf> {
        let root = if job.results_location.trim().is_empty() {
            self.config.default_results_root.clone()?
        } else {
            PathBuf::from(&job.results_location)
        };
        Some(root.join(job.display_name()))
    }

    /// Scenario indices to pass to the simulator; `0` runs all of them.
    pub fn scenario_runs(job: &JobRecord) -> Vec<i32> {
        if job.runs_all_scenarios() {
            vec![0]
        } else {
            job.scenarios.clone()
        }
    }

    async fn stage(&self, job: &JobRecord) -> Result<PathBuf> {
        let job_dir = self.job_dir(job);
        let source = Path::new(&job.source_location);

        if !source.is_dir() {
            return Err(FleetError::Execution(format!(
                "Source location is not a directory: {}",
                job.source_location
            )));
        }

        let copied = copy_dir_all(source, &job_dir).await?;
        tracing::debug!(job_id = %job.id, files = copied, dir = %job_dir.display(), "Project staged");
        Ok(job_dir)
    }

    async fn run_scenario(&self, job: &JobRecord, job_dir: &Path, scenario: i32) -> Result<i32> {
        let project = job_dir.join(&job.project_file);
        let scenario_arg = format!("{}{}", self.config.scenario_flag, scenario);

        tracing::info!(
            job_id = %job.id,
            scenario,
            simulator = %self.config.simulator_path.display(),
            "Starting simulator"
        );

        let output = Command::new(&self.config.simulator_path)
            .arg(&project)
            .arg(&scenario_arg)
            .current_dir(job_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                FleetError::Execution(format!(
                    "Failed to start simulator {}: {}",
                    self.config.simulator_path.display(),
                    e
                ))
            })?;

        let exit_code = output.status.code().unwrap_or(EXECUTION_FAILED_EXIT_CODE);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(job_id = %job.id, scenario, exit_code, stderr = %stderr.trim(), "Simulator failed");
        }

        Ok(exit_code)
    }

    async fn collect(&self, job: &JobRecord, job_dir: &Path) -> Result<()> {
        let Some(results_dir) = self.results_dir(job) else {
            tracing::warn!(job_id = %job.id, "No results location, leaving output in place");
            return Ok(());
        };

        let output_dir = job_dir.join(&self.config.output_dir_name);
        if !output_dir.is_dir() {
            tracing::warn!(job_id = %job.id, dir = %output_dir.display(), "Simulator produced no output directory");
            return Ok(());
        }

        let copied = copy_dir_all(&output_dir, &results_dir).await?;
        tracing::info!(job_id = %job.id, files = copied, results = %results_dir.display(), "Results collected");
        Ok(())
    }

    async fn try_execute(&self, job: &JobRecord) -> Result<i32> {
        let job_dir = self.stage(job).await?;

        let mut exit_code = EXECUTION_FAILED_EXIT_CODE;
        for scenario in Self::scenario_runs(job) {
            exit_code = self.run_scenario(job, &job_dir, scenario).await?;
            self.collect(job, &job_dir).await?;
            if exit_code != 0 {
                break;
            }
        }
        Ok(exit_code)
    }
}

#[tonic::async_trait]
impl JobExecutor for SimulationExecutor {
    async fn execute(&self, job: &JobRecord) -> ExecutionResult {
        tracing::info!(job_id = %job.id, name = %job.display_name(), "Executing job");

        match self.try_execute(job).await {
            Ok(exit_code) => {
                let error = (exit_code != 0).then(|| format!("Exit code: {}", exit_code));
                let result = ExecutionResult::from_exit_code(job.id, exit_code, error);
                tracing::info!(
                    job_id = %job.id,
                    status = %result.status,
                    exit_code,
                    "Job completed"
                );
                result
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Job execution failed");
                ExecutionResult::failed(job.id, e.to_string())
            }
        }
    }
}

/// Recursively copy `src` into `dst`, creating directories as needed.
/// Symlinks are followed and their targets copied as regular files and
/// directories; a link cycle fails the copy. Returns the number of files copied.
pub async fn copy_dir_all(src: &Path, dst: &Path) -> std::io::Result<u64> {
    let src = src.to_path_buf();
    let dst = dst.to_path_buf();

    tokio::task::spawn_blocking(move || copy_tree(&src, &dst))
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}

fn copy_tree(src: &Path, dst: &Path) -> std::io::Result<u64> {
    let mut copied = 0;

    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}
