use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    /// Complete and Failed jobs are never mutated again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Complete | JobStatus::Failed)
    }

    /// Status a tracker reports for a finished run.
    pub fn from_exit_code(exit_code: i32) -> Self {
        if exit_code == 0 {
            JobStatus::Complete
        } else {
            JobStatus::Failed
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A unit of submitted simulation work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub friendly_name: Option<String>,
    /// Project file inside the source location the simulator runs against.
    pub project_file: String,
    pub source_location: String,
    pub results_location: String,
    /// Scenario indices to run, in order. Empty or `[0]` means all scenarios.
    pub scenarios: Vec<i32>,
    pub submit_time: Option<DateTime<Utc>>,
    pub start_time: Option<DateTime<Utc>>,
    pub finish_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub owner: Option<Uuid>,
    pub status: JobStatus,
}

impl JobRecord {
    pub fn new(
        project_file: impl Into<String>,
        source_location: impl Into<String>,
        results_location: impl Into<String>,
    ) -> Self {
        Self::with_id(
            Uuid::new_v4(),
            project_file,
            source_location,
            results_location,
        )
    }

    pub fn with_id(
        id: Uuid,
        project_file: impl Into<String>,
        source_location: impl Into<String>,
        results_location: impl Into<String>,
    ) -> Self {
        Self {
            id,
            friendly_name: None,
            project_file: project_file.into(),
            source_location: source_location.into(),
            results_location: results_location.into(),
            scenarios: Vec::new(),
            submit_time: None,
            start_time: None,
            finish_time: None,
            exit_code: None,
            owner: None,
            status: JobStatus::Queued,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.friendly_name = if name.trim().is_empty() {
            None
        } else {
            Some(name)
        };
        self
    }

    pub fn with_scenarios(mut self, scenarios: Vec<i32>) -> Self {
        self.scenarios = scenarios;
        self
    }

    /// Friendly name when present, otherwise the id.
    pub fn display_name(&self) -> String {
        match &self.friendly_name {
            Some(name) => name.clone(),
            None => self.id.to_string(),
        }
    }

    pub fn runs_all_scenarios(&self) -> bool {
        self.scenarios.is_empty() || self.scenarios == [0]
    }

    /// Record the outcome of a run. Used by the tracker before reporting back.
    pub fn finish(&mut self, exit_code: i32, finished_at: DateTime<Utc>) {
        self.exit_code = Some(exit_code);
        self.status = JobStatus::from_exit_code(exit_code);
        self.finish_time = Some(finished_at);
    }
}
