pub mod job;
pub mod registry;
pub mod scrubber;
pub mod tracker;
pub mod trackers;

pub use job::{JobRecord, JobStatus};
pub use registry::{JobRegistry, JobSnapshot};
pub use scrubber::{Clock, Scrubber};
pub use tracker::{TrackerRecord, TrackerStatus};
pub use trackers::{ScrubReport, TrackerRegistry};
