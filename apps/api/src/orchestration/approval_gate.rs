use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use super::audit_ledger::AuditLedger;
use super::errors::{EngineError, EngineResult};
use super::events::{ActivityBroadcaster, ActivityEvent};
use super::metrics::{Counter, MetricsCollector};
use super::waitpoints::Waitpoints;
use crate::domain::approval::{ApprovalDecision, ApprovalRequest, ApprovalStatus};
use crate::domain::audit::AuditLogEntry;
use crate::domain::repositories::ApprovalRepository;
use crate::domain::workflow::StepAction;

/// Creates and resolves human-approval waitpoints
///
/// The gate only records decisions and completes waitpoints. Driving the
/// parked execution afterwards is the workflow engine's job.
pub struct ApprovalGate {
    repo: Arc<dyn ApprovalRepository>,
    waitpoints: Arc<Waitpoints>,
    ledger: Arc<AuditLedger>,
    broadcaster: Arc<dyn ActivityBroadcaster>,
    metrics: Arc<dyn MetricsCollector>,
}

/// A reviewer's resolution of one approval request
#[derive(Debug, Clone)]
pub struct Resolution {
    pub decision: ApprovalDecision,
    pub actor: Uuid,
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl ApprovalGate {
    pub fn new(
        repo: Arc<dyn ApprovalRepository>,
        waitpoints: Arc<Waitpoints>,
        ledger: Arc<AuditLedger>,
        broadcaster: Arc<dyn ActivityBroadcaster>,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            repo,
            waitpoints,
            ledger,
            broadcaster,
            metrics,
        }
    }

    pub fn waitpoints(&self) -> &Arc<Waitpoints> {
        &self.waitpoints
    }

    /// Opens the waitpoint a step will park on
    pub fn open_waitpoint(&self, execution_id: Uuid, step_id: &str) -> Uuid {
        self.waitpoints.create(execution_id, step_id)
    }

    #[tracing::instrument(skip(self))]
    pub async fn request_approval(
        &self,
        workspace_id: Uuid,
        execution_id: Uuid,
        step_id: &str,
        action: StepAction,
        waitpoint_token: Uuid,
    ) -> EngineResult<ApprovalRequest> {
        let request = ApprovalRequest::new(workspace_id, execution_id, step_id.to_string(), action, waitpoint_token);
        self.repo.insert(&request).await?;

        self.metrics.increment(Counter::ApprovalRequested);
        self.broadcaster.publish(ActivityEvent::ApprovalRequested {
            workspace_id,
            approval_id: request.id,
            execution_id,
            step_id: step_id.to_string(),
        });
        tracing::info!(approval_id = %request.id, "approval requested");

        Ok(request)
    }

    /// Applies a decision exactly once
    ///
    /// # Errors
    /// - `NotFound` if the request does not exist in the workspace
    /// - `AlreadyResolved` if it was resolved before, including by a
    ///   concurrent reviewer
    #[tracing::instrument(skip(self, resolution), fields(decision = ?resolution.decision))]
    pub async fn resolve(
        &self,
        workspace_id: Uuid,
        approval_id: Uuid,
        resolution: Resolution,
    ) -> EngineResult<ApprovalRequest> {
        let mut request = self
            .repo
            .find_by_id(workspace_id, approval_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Approval request", approval_id))?;

        request.resolve(
            resolution.decision,
            resolution.actor,
            resolution.reason.clone(),
            resolution.metadata,
        )?;
        if !self.repo.resolve(&request).await? {
            return Err(EngineError::AlreadyResolved(approval_id));
        }

        let approved = request.status == ApprovalStatus::Approved;
        if !self.waitpoints.resolve(request.waitpoint_token, request.status) {
            tracing::debug!(approval_id = %approval_id, "no open waitpoint for approval");
        }

        self.ledger
            .record(
                AuditLogEntry::human(
                    workspace_id,
                    if approved { "approval_approved" } else { "approval_rejected" },
                )
                .execution(request.execution_id)
                .context(json!({
                    "approval_id": request.id,
                    "step_id": request.step_id,
                    "action": request.action,
                    "decided_by": resolution.actor,
                    "reason": resolution.reason,
                })),
            )
            .await;
        self.broadcaster.publish(ActivityEvent::ApprovalResolved {
            workspace_id,
            approval_id,
            approved,
        });
        tracing::info!(approval_id = %approval_id, approved, "approval resolved");

        Ok(request)
    }

    pub async fn find(&self, workspace_id: Uuid, approval_id: Uuid) -> EngineResult<ApprovalRequest> {
        self.repo
            .find_by_id(workspace_id, approval_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Approval request", approval_id))
    }

    pub async fn pending(&self, workspace_id: Uuid) -> EngineResult<Vec<ApprovalRequest>> {
        Ok(self.repo.find_pending(workspace_id).await?)
    }

    pub async fn for_execution(&self, workspace_id: Uuid, execution_id: Uuid) -> EngineResult<Vec<ApprovalRequest>> {
        Ok(self.repo.find_by_execution(workspace_id, execution_id).await?)
    }

    /// Latest request for a step, if any
    pub async fn latest_for_step(
        &self,
        workspace_id: Uuid,
        execution_id: Uuid,
        step_id: &str,
    ) -> EngineResult<Option<ApprovalRequest>> {
        Ok(self.repo.find_latest_for_step(workspace_id, execution_id, step_id).await?)
    }
}
