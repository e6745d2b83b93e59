// AI-completion port
//
// The orchestrator and the workflow engine only ever talk to a model through
// this trait; infrastructure provides the Anthropic adapter and tests provide
// scripted clients.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One completion call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Name of the prompt template that produced this request
    pub template: String,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub model: String,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
}

impl CompletionResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            model: String::new(),
            input_tokens: None,
            output_tokens: None,
        }
    }
}

/// Failure of the completion collaborator
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompletionError {
    #[error("Completion timed out")]
    Timeout,

    #[error("Completion rate limited")]
    RateLimited,

    #[error("Connection to completion service failed: {0}")]
    Connection(String),

    #[error("Completion service rejected credentials: {0}")]
    Unauthorized(String),

    #[error("Invalid completion request: {0}")]
    InvalidRequest(String),

    #[error("Completion service error {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Malformed completion response: {0}")]
    MalformedResponse(String),
}

impl CompletionError {
    /// Transient failures that may succeed on another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Timeout | CompletionError::RateLimited | CompletionError::Connection(_) => true,
            CompletionError::Upstream { status, .. } => *status >= 500,
            CompletionError::Unauthorized(_)
            | CompletionError::InvalidRequest(_)
            | CompletionError::MalformedResponse(_) => false,
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(CompletionError::Timeout.is_retryable());
        assert!(CompletionError::RateLimited.is_retryable());
        assert!(CompletionError::Connection("reset".to_string()).is_retryable());
        assert!(CompletionError::Upstream {
            status: 503,
            message: "overloaded".to_string()
        }
        .is_retryable());
    }

    #[test]
    fn caller_errors_are_not_retryable() {
        assert!(!CompletionError::Unauthorized("bad key".to_string()).is_retryable());
        assert!(!CompletionError::InvalidRequest("max_tokens".to_string()).is_retryable());
        assert!(!CompletionError::Upstream {
            status: 404,
            message: "no model".to_string()
        }
        .is_retryable());
    }
}
