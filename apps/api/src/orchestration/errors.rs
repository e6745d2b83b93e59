use thiserror::Error;
use uuid::Uuid;

use crate::agents::AgentError;
use crate::domain::approval::AlreadyResolved;
use crate::domain::execution::{ExecutionStatus, TransitionError};
use crate::domain::repositories::RepositoryError;

/// Errors surfaced by the orchestration services
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input or a request the current state does not allow
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: ExecutionStatus, to: ExecutionStatus },

    #[error("Approval request {0} has already been resolved")]
    AlreadyResolved(Uuid),

    /// A concurrent writer changed the execution first
    #[error("Execution {0} was modified concurrently")]
    Conflict(Uuid),

    #[error("Rate limit exceeded; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        EngineError::NotFound { entity, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }
}

impl From<TransitionError> for EngineError {
    fn from(err: TransitionError) -> Self {
        EngineError::InvalidTransition {
            from: err.from,
            to: err.to,
        }
    }
}

impl From<AlreadyResolved> for EngineError {
    fn from(err: AlreadyResolved) -> Self {
        EngineError::AlreadyResolved(err.id)
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
