use super::RepoResult;
use crate::domain::execution::{ExecutionStatus, WorkflowExecution};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository trait for WorkflowExecution aggregate
///
/// Executions are never blindly overwritten: every update after the insert
/// goes through [`ExecutionRepository::compare_and_set`].
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn insert(&self, execution: &WorkflowExecution) -> RepoResult<()>;

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<WorkflowExecution>>;

    /// Conditionally replaces the stored execution
    ///
    /// The write only happens if the stored row still has `expected_status`
    /// and the same revision as `execution`. The stored revision becomes
    /// `execution.revision() + 1`. Returns false when another writer got
    /// there first.
    async fn compare_and_set(
        &self,
        execution: &WorkflowExecution,
        expected_status: ExecutionStatus,
    ) -> RepoResult<bool>;

    /// Number of executions that reference a workflow version
    async fn count_by_workflow(&self, workspace_id: Uuid, workflow_id: Uuid) -> RepoResult<u64>;

    /// Executions of a workspace, newest first, optionally by status
    async fn find_by_workspace(
        &self,
        workspace_id: Uuid,
        status: Option<ExecutionStatus>,
    ) -> RepoResult<Vec<WorkflowExecution>>;
}
