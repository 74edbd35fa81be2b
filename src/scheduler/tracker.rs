use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerStatus {
    Idle,
    Running,
    NoResponse,
    /// Only seen before the first heartbeat.
    Unknown,
}

impl std::fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackerStatus::Idle => write!(f, "idle"),
            TrackerStatus::Running => write!(f, "running"),
            TrackerStatus::NoResponse => write!(f, "no-response"),
            TrackerStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// What the orchestrator knows about one tracker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerRecord {
    pub id: Uuid,
    pub host_label: String,
    pub status: TrackerStatus,
    /// Set by the orchestrator when it accepts a heartbeat.
    pub last_checkin: Option<DateTime<Utc>>,
    pub current_job: Option<Uuid>,
}

impl TrackerRecord {
    pub fn new(host_label: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4(), host_label)
    }

    pub fn with_id(id: Uuid, host_label: impl Into<String>) -> Self {
        Self {
            id,
            host_label: host_label.into(),
            status: TrackerStatus::Unknown,
            last_checkin: None,
            current_job: None,
        }
    }

    pub fn set_idle(&mut self) {
        self.status = TrackerStatus::Idle;
        self.current_job = None;
    }

    pub fn set_running(&mut self, job_id: Uuid) {
        self.status = TrackerStatus::Running;
        self.current_job = Some(job_id);
    }

    /// Milliseconds since the last accepted heartbeat, if there was one.
    pub fn silence_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_checkin
            .map(|seen| now.signed_duration_since(seen).num_milliseconds())
    }
}
