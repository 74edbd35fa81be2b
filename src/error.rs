use thiserror::Error;

#[derive(Error, Debug)]
pub enum FleetError {
    #[error("Orchestrator unreachable: {0}")]
    Unreachable(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Orchestrator discovery failed: {0}")]
    Discovery(String),

    #[error("Job execution failed: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("gRPC error: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FleetError {
    /// True when the error means the orchestrator could not be reached, as
    /// opposed to the orchestrator answering with a rejection.
    pub fn is_unreachable(&self) -> bool {
        match self {
            FleetError::Unreachable(_) | FleetError::Transport(_) => true,
            FleetError::Rpc(status) => matches!(
                status.code(),
                tonic::Code::Unavailable
                    | tonic::Code::DeadlineExceeded
                    | tonic::Code::Cancelled
                    | tonic::Code::Unknown
            ),
            _ => false,
        }
    }
}

impl From<FleetError> for tonic::Status {
    fn from(err: FleetError) -> Self {
        match err {
            FleetError::InvalidId(id) => {
                tonic::Status::invalid_argument(format!("Invalid identifier: {}", id))
            }
            FleetError::Rpc(status) => status,
            other => tonic::Status::internal(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
