//! Tracker-side execution engine.
//!
//! A tracker runs two independent loops against the orchestrator plus a
//! single executor slot:
//! - **Heartbeat**: checks the tracker record in every interval, best effort
//! - **Job polling**: requests work, backing off to a slower interval while
//!   the orchestrator is unreachable and suspending while a job runs
//! - **Execution**: [`JobExecutor::execute`] runs one job at a time and
//!   hands its result back to the agent over a channel
//!
//! # Delivery
//!
//! Finished jobs stay in the agent's unacknowledged list until
//! `ReturnFinishedJob` succeeds. Each completion, and each poll while the
//! list is non-empty, retries delivery in order. Duplicates are harmless
//! because completion is idempotent on the orchestrator side.

pub mod agent;
pub mod client;
pub mod executor;
pub mod heartbeat;

pub use agent::{next_poll_delay, PollOutcome, TrackerAgent};
pub use client::{GrpcOrchestratorClient, OrchestratorClient};
pub use executor::{ExecutionResult, JobExecutor, SimulationExecutor};
pub use heartbeat::HeartbeatSender;
