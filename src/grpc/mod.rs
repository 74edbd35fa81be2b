pub mod convert;
pub mod orchestrator_service;
pub mod server;
pub mod tracker_service;

pub use server::GrpcServer;
