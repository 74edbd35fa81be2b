pub mod config;
pub mod dashboard;
pub mod discovery;
pub mod error;
pub mod grpc;
pub mod node;
pub mod orchestrator;
pub mod scheduler;
pub mod shutdown;
pub mod worker;

pub use error::{FleetError, Result};
pub use orchestrator::Orchestrator;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("simfleet");
}
