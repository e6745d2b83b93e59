use super::RepoResult;
use crate::domain::workflow::Workflow;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository trait for Workflow definitions
///
/// Each version of a workflow is its own row.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Save a workflow version (insert or update)
    async fn save(&self, workflow: &Workflow) -> RepoResult<()>;

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<Workflow>>;

    /// All versions in a workspace, newest first
    async fn find_by_workspace(&self, workspace_id: Uuid) -> RepoResult<Vec<Workflow>>;
}
