// Infrastructure layer module
// Contains database adapters and external service integrations
// Follows Hexagonal Architecture

pub mod completion;
pub mod repositories;

use sqlx::PgPool;
use std::sync::Arc;

use crate::domain::repositories::{
    AgentRepository, ApprovalRepository, AuditRepository, ExecutionRepository, MessageRepository, TeamRepository,
    WorkflowRepository,
};
use repositories::*;

/// One adapter per aggregate, shared by every service
#[derive(Clone)]
pub struct Repositories {
    pub agents: Arc<dyn AgentRepository>,
    pub teams: Arc<dyn TeamRepository>,
    pub workflows: Arc<dyn WorkflowRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub approvals: Arc<dyn ApprovalRepository>,
    pub audit: Arc<dyn AuditRepository>,
}

impl Repositories {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            agents: Arc::new(PostgresAgentRepository::new(pool.clone())),
            teams: Arc::new(PostgresTeamRepository::new(pool.clone())),
            workflows: Arc::new(PostgresWorkflowRepository::new(pool.clone())),
            executions: Arc::new(PostgresExecutionRepository::new(pool.clone())),
            messages: Arc::new(PostgresMessageRepository::new(pool.clone())),
            approvals: Arc::new(PostgresApprovalRepository::new(pool.clone())),
            audit: Arc::new(PostgresAuditRepository::new(pool)),
        }
    }

    /// Process-local store for tests and running without a database
    pub fn in_memory() -> Self {
        Self {
            agents: Arc::new(InMemoryAgentRepository::new()),
            teams: Arc::new(InMemoryTeamRepository::new()),
            workflows: Arc::new(InMemoryWorkflowRepository::new()),
            executions: Arc::new(InMemoryExecutionRepository::new()),
            messages: Arc::new(InMemoryMessageRepository::new()),
            approvals: Arc::new(InMemoryApprovalRepository::new()),
            audit: Arc::new(InMemoryAuditRepository::new()),
        }
    }
}
