use super::RepoResult;
use crate::domain::agent::Agent;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository trait for the Agent registry
#[async_trait]
pub trait AgentRepository: Send + Sync {
    /// Save an agent (insert or update)
    async fn save(&self, agent: &Agent) -> RepoResult<()>;

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<Agent>>;

    /// All agents of a workspace, oldest first
    async fn find_by_workspace(&self, workspace_id: Uuid) -> RepoResult<Vec<Agent>>;

    /// Agents among `ids` that exist in the workspace; unknown ids are skipped
    async fn find_many(&self, workspace_id: Uuid, ids: &[Uuid]) -> RepoResult<Vec<Agent>>;
}
