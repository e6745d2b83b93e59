use super::completion::CompletionError;
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in the agent system
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("LLM API error: {0}")]
    Completion(#[from] CompletionError),

    /// The coordinator produced a plan the orchestrator cannot act on
    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Agent not found: {0}")]
    AgentNotFound(Uuid),

    #[error("Agent {0} is not active")]
    AgentInactive(Uuid),

    #[error("Task execution failed: {0}")]
    TaskExecutionFailed(String),

    #[error("Step timed out after {0}ms")]
    Timeout(u64),
}

impl AgentError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AgentError::Completion(e) => e.is_retryable(),
            AgentError::Timeout(_) => true,
            _ => false,
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
