use std::time::Duration;

use thiserror::Error;

use crate::status::WorkerStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("Runtime failed to initialize: {0}")]
    Initialization(String),

    #[error("Runtime not ready (status: {0})")]
    NotReady(WorkerStatus),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Test execution timed out ({}s). Possible infinite loop.", .0.as_secs())]
    Timeout(Duration),

    #[error("Runtime transport error: {0}")]
    Transport(String),

    #[error("Runtime not initialized")]
    NotInitialized,

    #[error("Orchestrator is poisoned and must be rebuilt")]
    Poisoned,

    #[error("Orchestrator has shut down")]
    Shutdown,
}

impl OrchestratorError {
    /// Whether this failure left the instance permanently unusable.
    pub fn poisons_instance(&self) -> bool {
        matches!(
            self,
            OrchestratorError::Timeout(_) | OrchestratorError::Transport(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
