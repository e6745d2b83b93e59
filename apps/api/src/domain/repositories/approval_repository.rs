use super::RepoResult;
use crate::domain::approval::ApprovalRequest;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository trait for approval requests
#[async_trait]
pub trait ApprovalRepository: Send + Sync {
    async fn insert(&self, request: &ApprovalRequest) -> RepoResult<()>;

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<ApprovalRequest>>;

    /// Most recent request for a step of an execution
    async fn find_latest_for_step(
        &self,
        workspace_id: Uuid,
        execution_id: Uuid,
        step_id: &str,
    ) -> RepoResult<Option<ApprovalRequest>>;

    /// Writes the decision only if the stored request is still pending
    ///
    /// Returns false when it was resolved concurrently.
    async fn resolve(&self, request: &ApprovalRequest) -> RepoResult<bool>;

    /// Pending requests of a workspace, oldest first
    async fn find_pending(&self, workspace_id: Uuid) -> RepoResult<Vec<ApprovalRequest>>;

    async fn find_by_execution(&self, workspace_id: Uuid, execution_id: Uuid) -> RepoResult<Vec<ApprovalRequest>>;
}
