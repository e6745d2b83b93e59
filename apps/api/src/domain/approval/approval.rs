use crate::domain::workflow::StepAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "approval_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApprovalStatus::Pending => write!(f, "pending"),
            ApprovalStatus::Approved => write!(f, "approved"),
            ApprovalStatus::Rejected => write!(f, "rejected"),
        }
    }
}

/// A reviewer's verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
    Approve,
    Reject,
}

impl ApprovalDecision {
    pub fn resulting_status(&self) -> ApprovalStatus {
        match self {
            ApprovalDecision::Approve => ApprovalStatus::Approved,
            ApprovalDecision::Reject => ApprovalStatus::Rejected,
        }
    }
}

/// Who decided, when, and why
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub decided_by: Uuid,
    pub reason: Option<String>,
    pub decided_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Approval request {id} has already been resolved as {status}")]
pub struct AlreadyResolved {
    pub id: Uuid,
    pub status: ApprovalStatus,
}

/// A human-approval waitpoint for one step of one execution
///
/// # Invariants
/// - Created `Pending`
/// - Resolved exactly once; the decision is immutable afterwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub execution_id: Uuid,
    pub step_id: String,
    pub action: StepAction,
    /// Handle of the in-process waitpoint the engine parks on
    pub waitpoint_token: Uuid,
    pub status: ApprovalStatus,
    pub decision: Option<DecisionRecord>,
    pub created_at: DateTime<Utc>,
}

impl ApprovalRequest {
    pub fn new(
        workspace_id: Uuid,
        execution_id: Uuid,
        step_id: String,
        action: StepAction,
        waitpoint_token: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            execution_id,
            step_id,
            action,
            waitpoint_token,
            status: ApprovalStatus::Pending,
            decision: None,
            created_at: Utc::now(),
        }
    }

    /// Applies a decision; fails if one was already applied
    pub fn resolve(
        &mut self,
        decision: ApprovalDecision,
        decided_by: Uuid,
        reason: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<(), AlreadyResolved> {
        if self.status != ApprovalStatus::Pending {
            return Err(AlreadyResolved {
                id: self.id,
                status: self.status,
            });
        }

        self.status = decision.resulting_status();
        self.decision = Some(DecisionRecord {
            decided_by,
            reason,
            decided_at: Utc::now(),
            metadata,
        });
        Ok(())
    }

    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ApprovalRequest {
        ApprovalRequest::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "send".to_string(),
            StepAction::SendEmail,
            Uuid::new_v4(),
        )
    }

    #[test]
    fn new_request_is_pending() {
        let request = request();
        assert!(request.is_pending());
        assert!(request.decision.is_none());
    }

    #[test]
    fn approve_records_decision() {
        let mut request = request();
        let reviewer = Uuid::new_v4();

        request
            .resolve(ApprovalDecision::Approve, reviewer, Some("Looks good".to_string()), None)
            .unwrap();

        assert_eq!(request.status, ApprovalStatus::Approved);
        let decision = request.decision.as_ref().unwrap();
        assert_eq!(decision.decided_by, reviewer);
        assert_eq!(decision.reason.as_deref(), Some("Looks good"));
    }

    #[test]
    fn second_resolution_fails_and_keeps_first_decision() {
        let mut request = request();
        let first_reviewer = Uuid::new_v4();
        request
            .resolve(ApprovalDecision::Reject, first_reviewer, None, None)
            .unwrap();

        let err = request
            .resolve(ApprovalDecision::Approve, Uuid::new_v4(), None, None)
            .unwrap_err();

        assert_eq!(err.status, ApprovalStatus::Rejected);
        assert_eq!(request.status, ApprovalStatus::Rejected);
        assert_eq!(request.decision.unwrap().decided_by, first_reviewer);
    }
}
