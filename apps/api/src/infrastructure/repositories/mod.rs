// Repository implementations (data access layer)
// Adapters that implement domain repository interfaces

pub mod in_memory;
pub mod postgres_agent_repository;
pub mod postgres_approval_repository;
pub mod postgres_audit_repository;
pub mod postgres_execution_repository;
pub mod postgres_message_repository;
pub mod postgres_team_repository;
pub mod postgres_workflow_repository;

pub use in_memory::{
    InMemoryAgentRepository, InMemoryApprovalRepository, InMemoryAuditRepository, InMemoryExecutionRepository,
    InMemoryMessageRepository, InMemoryTeamRepository, InMemoryWorkflowRepository,
};
pub use postgres_agent_repository::PostgresAgentRepository;
pub use postgres_approval_repository::PostgresApprovalRepository;
pub use postgres_audit_repository::PostgresAuditRepository;
pub use postgres_execution_repository::PostgresExecutionRepository;
pub use postgres_message_repository::PostgresMessageRepository;
pub use postgres_team_repository::PostgresTeamRepository;
pub use postgres_workflow_repository::PostgresWorkflowRepository;

use crate::domain::repositories::RepositoryError;

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                RepositoryError::Unavailable(err.to_string())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => RepositoryError::Corrupt(err.to_string()),
            other => RepositoryError::Query(other.to_string()),
        }
    }
}
