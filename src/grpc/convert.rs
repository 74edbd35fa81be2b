//! Conversions between registry records and their protobuf messages.
//!
//! Timestamps travel as epoch milliseconds with `0` meaning unset, ids as
//! UUID strings with the empty string meaning "none".

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{FleetError, Result};
use crate::proto;
use crate::proto::{JobStatus as ProtoJobStatus, TrackerStatus as ProtoTrackerStatus};
use crate::scheduler::{JobRecord, JobStatus, TrackerRecord, TrackerStatus};

pub fn job_status_to_proto(status: JobStatus) -> ProtoJobStatus {
    match status {
        JobStatus::Queued => ProtoJobStatus::Queued,
        JobStatus::Running => ProtoJobStatus::Running,
        JobStatus::Complete => ProtoJobStatus::Complete,
        JobStatus::Failed => ProtoJobStatus::Failed,
    }
}

/// `None` for the unspecified value, which only means "no filter".
pub fn job_status_from_proto(status: i32) -> Option<JobStatus> {
    match ProtoJobStatus::try_from(status) {
        Ok(ProtoJobStatus::Queued) => Some(JobStatus::Queued),
        Ok(ProtoJobStatus::Running) => Some(JobStatus::Running),
        Ok(ProtoJobStatus::Complete) => Some(JobStatus::Complete),
        Ok(ProtoJobStatus::Failed) => Some(JobStatus::Failed),
        Ok(ProtoJobStatus::Unspecified) | Err(_) => None,
    }
}

pub fn tracker_status_to_proto(status: TrackerStatus) -> ProtoTrackerStatus {
    match status {
        TrackerStatus::Idle => ProtoTrackerStatus::Idle,
        TrackerStatus::Running => ProtoTrackerStatus::Running,
        TrackerStatus::NoResponse => ProtoTrackerStatus::NoResponse,
        TrackerStatus::Unknown => ProtoTrackerStatus::Unknown,
    }
}

pub fn tracker_status_from_proto(status: i32) -> TrackerStatus {
    match ProtoTrackerStatus::try_from(status) {
        Ok(ProtoTrackerStatus::Idle) => TrackerStatus::Idle,
        Ok(ProtoTrackerStatus::Running) => TrackerStatus::Running,
        Ok(ProtoTrackerStatus::NoResponse) => TrackerStatus::NoResponse,
        Ok(ProtoTrackerStatus::Unknown) | Err(_) => TrackerStatus::Unknown,
    }
}

pub fn job_to_proto(job: &JobRecord) -> proto::Job {
    proto::Job {
        job_id: job.id.to_string(),
        friendly_name: job.friendly_name.clone().unwrap_or_default(),
        project_file: job.project_file.clone(),
        source_location: job.source_location.clone(),
        results_location: job.results_location.clone(),
        scenarios: job.scenarios.clone(),
        submit_time_ms: to_millis(job.submit_time),
        start_time_ms: to_millis(job.start_time),
        finish_time_ms: to_millis(job.finish_time),
        exit_code: job.exit_code,
        owner_tracker_id: id_to_string(job.owner),
        status: job_status_to_proto(job.status) as i32,
    }
}

pub fn job_from_proto(job: proto::Job) -> Result<JobRecord> {
    let id = parse_id(&job.job_id)?;
    let owner = parse_optional_id(&job.owner_tracker_id)?;
    let status = job_status_from_proto(job.status).unwrap_or(JobStatus::Queued);

    Ok(JobRecord {
        id,
        friendly_name: if job.friendly_name.is_empty() {
            None
        } else {
            Some(job.friendly_name)
        },
        project_file: job.project_file,
        source_location: job.source_location,
        results_location: job.results_location,
        scenarios: job.scenarios,
        submit_time: from_millis(job.submit_time_ms),
        start_time: from_millis(job.start_time_ms),
        finish_time: from_millis(job.finish_time_ms),
        exit_code: job.exit_code,
        owner,
        status,
    })
}

pub fn tracker_to_proto(tracker: &TrackerRecord) -> proto::Tracker {
    proto::Tracker {
        tracker_id: tracker.id.to_string(),
        host_label: tracker.host_label.clone(),
        status: tracker_status_to_proto(tracker.status) as i32,
        last_checkin_ms: to_millis(tracker.last_checkin),
        current_job_id: id_to_string(tracker.current_job),
    }
}

pub fn tracker_from_proto(tracker: proto::Tracker) -> Result<TrackerRecord> {
    Ok(TrackerRecord {
        id: parse_id(&tracker.tracker_id)?,
        host_label: tracker.host_label,
        status: tracker_status_from_proto(tracker.status),
        last_checkin: from_millis(tracker.last_checkin_ms),
        current_job: parse_optional_id(&tracker.current_job_id)?,
    })
}

pub fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|_| FleetError::InvalidId(raw.to_string()))
}

fn parse_optional_id(raw: &str) -> Result<Option<Uuid>> {
    if raw.is_empty() {
        Ok(None)
    } else {
        parse_id(raw).map(Some)
    }
}

fn id_to_string(id: Option<Uuid>) -> String {
    id.map(|id| id.to_string()).unwrap_or_default()
}

fn to_millis(ts: Option<DateTime<Utc>>) -> i64 {
    ts.map(|t| t.timestamp_millis()).unwrap_or(0)
}

fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    if ms <= 0 {
        None
    } else {
        DateTime::from_timestamp_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_use_wire_sentinels() {
        let job = JobRecord::new("proj.envx", "/src", "/out");
        let wire = job_to_proto(&job);
        assert_eq!(wire.submit_time_ms, 0);
        assert_eq!(wire.owner_tracker_id, "");
        assert_eq!(wire.friendly_name, "");
        assert!(wire.exit_code.is_none());
        assert_eq!(wire.status, ProtoJobStatus::Queued as i32);

        let back = job_from_proto(wire).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        let mut wire = job_to_proto(&JobRecord::new("p", "s", "r"));
        wire.job_id = "not-a-uuid".to_string();
        assert!(matches!(job_from_proto(wire), Err(FleetError::InvalidId(_))));

        let mut wire = tracker_to_proto(&TrackerRecord::new("host"));
        wire.current_job_id = "garbage".to_string();
        assert!(tracker_from_proto(wire).is_err());
    }

    #[test]
    fn unspecified_job_status_means_no_filter() {
        assert_eq!(job_status_from_proto(ProtoJobStatus::Unspecified as i32), None);
        assert_eq!(job_status_from_proto(99), None);
        assert_eq!(
            job_status_from_proto(ProtoJobStatus::Failed as i32),
            Some(JobStatus::Failed)
        );
    }

    #[test]
    fn timestamps_keep_millisecond_precision() {
        let now = DateTime::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();
        let mut tracker = TrackerRecord::new("node-7");
        tracker.last_checkin = Some(now);
        tracker.set_running(Uuid::new_v4());

        let back = tracker_from_proto(tracker_to_proto(&tracker)).unwrap();
        assert_eq!(back, tracker);
    }
}
