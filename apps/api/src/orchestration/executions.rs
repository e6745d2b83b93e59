use std::sync::Arc;
use uuid::Uuid;

use super::errors::{EngineError, EngineResult};
use super::events::{ActivityBroadcaster, ActivityEvent};
use crate::domain::execution::{ExecutionStatus, WorkflowExecution};
use crate::domain::repositories::ExecutionRepository;

/// Loads and conditionally writes executions
///
/// Every write after the insert is a compare-and-set on status and
/// revision, so two writers can never both move the same execution.
pub struct ExecutionTracker {
    repo: Arc<dyn ExecutionRepository>,
    broadcaster: Arc<dyn ActivityBroadcaster>,
}

impl ExecutionTracker {
    pub fn new(repo: Arc<dyn ExecutionRepository>, broadcaster: Arc<dyn ActivityBroadcaster>) -> Self {
        Self { repo, broadcaster }
    }

    pub async fn load(&self, workspace_id: Uuid, execution_id: Uuid) -> EngineResult<WorkflowExecution> {
        self.repo
            .find_by_id(workspace_id, execution_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Execution", execution_id))
    }

    pub async fn list(
        &self,
        workspace_id: Uuid,
        status: Option<ExecutionStatus>,
    ) -> EngineResult<Vec<WorkflowExecution>> {
        Ok(self.repo.find_by_workspace(workspace_id, status).await?)
    }

    pub async fn insert(&self, execution: &WorkflowExecution) -> EngineResult<()> {
        self.repo.insert(execution).await?;
        Ok(())
    }

    /// Writes `execution` if the stored copy still has `expected` status
    /// and the same revision
    ///
    /// # Errors
    /// - `Conflict` when another writer changed the execution first
    pub async fn commit(&self, execution: &mut WorkflowExecution, expected: ExecutionStatus) -> EngineResult<()> {
        if !self.repo.compare_and_set(execution, expected).await? {
            return Err(EngineError::Conflict(execution.id()));
        }
        execution.mark_persisted();

        if execution.status() != expected {
            tracing::info!(
                execution_id = %execution.id(),
                from = %expected,
                to = %execution.status(),
                "execution status changed"
            );
            self.broadcaster.publish(ActivityEvent::ExecutionStatusChanged {
                workspace_id: execution.workspace_id(),
                execution_id: execution.id(),
                status: execution.status(),
            });
        }
        Ok(())
    }

    /// Moves an execution along one edge of the state machine and commits it
    pub async fn transition(&self, execution: &mut WorkflowExecution, next: ExecutionStatus) -> EngineResult<()> {
        let expected = execution.status();
        execution.transition_to(next)?;
        self.commit(execution, expected).await
    }
}
