// Repository traits (ports in hexagonal architecture)
// Every lookup is scoped to a workspace; adapters live in infrastructure

pub mod agent_repository;
pub mod approval_repository;
pub mod audit_repository;
pub mod execution_repository;
pub mod message_repository;
pub mod team_repository;
pub mod workflow_repository;

pub use agent_repository::AgentRepository;
pub use approval_repository::ApprovalRepository;
pub use audit_repository::AuditRepository;
pub use execution_repository::ExecutionRepository;
pub use message_repository::MessageRepository;
pub use team_repository::TeamRepository;
pub use workflow_repository::WorkflowRepository;

use thiserror::Error;

/// Datastore failure surfaced by a repository adapter
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The store could not be reached; the operation may succeed if retried
    #[error("Datastore unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    /// A stored row could not be mapped back into the domain
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl RepositoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Unavailable(_))
    }
}

pub type RepoResult<T> = Result<T, RepositoryError>;
