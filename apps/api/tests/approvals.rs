//! Approval gate and audit ledger integration tests

mod support;

use async_trait::async_trait;
use ghostpirates_orchestrator::domain::approval::{ApprovalDecision, ApprovalStatus};
use ghostpirates_orchestrator::domain::audit::{AuditLogEntry, AuditQuery};
use ghostpirates_orchestrator::domain::repositories::{AuditRepository, RepoResult, RepositoryError};
use ghostpirates_orchestrator::domain::workflow::StepAction;
use ghostpirates_orchestrator::infrastructure::Repositories;
use ghostpirates_orchestrator::orchestration::{Counter, EngineError, EngineSettings, Resolution};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use support::{Harness, ScriptedCompletion};
use uuid::Uuid;

/// Fails the first `failures` appends, then behaves
struct FlakyAudit {
    inner: Arc<dyn AuditRepository>,
    failures: AtomicUsize,
}

#[async_trait]
impl AuditRepository for FlakyAudit {
    async fn append(&self, entry: &AuditLogEntry) -> RepoResult<()> {
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(RepositoryError::Unavailable("audit store down".to_string()));
        }
        self.inner.append(entry).await
    }

    async fn query(&self, workspace_id: Uuid, query: &AuditQuery) -> RepoResult<Vec<AuditLogEntry>> {
        self.inner.query(workspace_id, query).await
    }
}

fn decision(decision: ApprovalDecision, actor: Uuid, reason: &str) -> Resolution {
    Resolution {
        decision,
        actor,
        reason: Some(reason.to_string()),
        metadata: None,
    }
}

#[tokio::test]
async fn test_second_resolution_is_rejected() {
    let h = Harness::new(ScriptedCompletion::new());
    let gate = &h.services.approvals;
    let execution_id = Uuid::new_v4();
    let token = gate.open_waitpoint(execution_id, "send");
    let request = gate
        .request_approval(h.workspace_id, execution_id, "send", StepAction::SendEmail, token)
        .await
        .unwrap();
    assert_eq!(request.status, ApprovalStatus::Pending);

    let first = gate
        .resolve(h.workspace_id, request.id, decision(ApprovalDecision::Approve, h.user_id, "ship it"))
        .await
        .unwrap();
    assert_eq!(first.status, ApprovalStatus::Approved);

    let second = gate
        .resolve(h.workspace_id, request.id, decision(ApprovalDecision::Reject, Uuid::new_v4(), "wait"))
        .await
        .unwrap_err();
    assert!(matches!(second, EngineError::AlreadyResolved(id) if id == request.id));

    let stored = gate.find(h.workspace_id, request.id).await.unwrap();
    assert_eq!(stored.status, ApprovalStatus::Approved);
    let record = stored.decision.unwrap();
    assert_eq!(record.decided_by, h.user_id);
    assert_eq!(record.reason.as_deref(), Some("ship it"));
    assert!(gate.pending(h.workspace_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_resolution_completes_waitpoint() {
    let h = Harness::new(ScriptedCompletion::new());
    let gate = &h.services.approvals;
    let execution_id = Uuid::new_v4();
    let token = gate.open_waitpoint(execution_id, "publish");
    let request = gate
        .request_approval(h.workspace_id, execution_id, "publish", StepAction::Notify, token)
        .await
        .unwrap();

    let waitpoints = gate.waitpoints().clone();
    let waiter = tokio::spawn(async move { waitpoints.wait(token).await });
    tokio::task::yield_now().await;

    gate.resolve(h.workspace_id, request.id, decision(ApprovalDecision::Reject, h.user_id, "no"))
        .await
        .unwrap();

    assert_eq!(waiter.await.unwrap(), Some(ApprovalStatus::Rejected));
}

#[tokio::test]
async fn test_resolving_unknown_request_is_not_found() {
    let h = Harness::new(ScriptedCompletion::new());

    let err = h
        .services
        .approvals
        .resolve(h.workspace_id, Uuid::new_v4(), decision(ApprovalDecision::Approve, h.user_id, "ok"))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::NotFound { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_audit_write_failure_never_blocks_and_is_redelivered() {
    let base = Repositories::in_memory();
    let audit: Arc<dyn AuditRepository> = Arc::new(FlakyAudit {
        inner: base.audit.clone(),
        failures: AtomicUsize::new(1),
    });
    let repos = Repositories { audit, ..base };
    let h = Harness::with_repos(repos, ScriptedCompletion::new(), EngineSettings::default());
    let ledger = &h.services.ledger;

    ledger
        .record(AuditLogEntry::human(h.workspace_id, "execution_paused").success(true))
        .await;
    assert_eq!(h.services.metrics.get(Counter::AuditWriteFailure), 1);
    assert!(ledger
        .query(h.workspace_id, &AuditQuery::default())
        .await
        .unwrap()
        .is_empty());

    tokio::time::sleep(Duration::from_secs(1)).await;

    let entries = ledger.query(h.workspace_id, &AuditQuery::default()).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action_type, "execution_paused");
    assert!(!entries[0].was_automatic);
}

#[tokio::test]
async fn test_audit_query_filters_and_validates() {
    let h = Harness::new(ScriptedCompletion::new());
    let ledger = &h.services.ledger;
    let execution_id = Uuid::new_v4();

    ledger
        .record(AuditLogEntry::automatic(h.workspace_id, "step_executed").execution(execution_id))
        .await;
    ledger
        .record(AuditLogEntry::human(h.workspace_id, "approval_approved").execution(execution_id))
        .await;
    ledger
        .record(AuditLogEntry::automatic(h.workspace_id, "step_executed").success(false))
        .await;

    let human = ledger
        .query(
            h.workspace_id,
            &AuditQuery {
                was_automatic: Some(false),
                ..AuditQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(human.len(), 1);

    let for_execution = ledger
        .query(
            h.workspace_id,
            &AuditQuery {
                execution_id: Some(execution_id),
                ..AuditQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(for_execution.len(), 2);

    let now = chrono::Utc::now();
    let err = ledger
        .query(
            h.workspace_id,
            &AuditQuery {
                from: Some(now),
                to: Some(now - chrono::Duration::hours(1)),
                ..AuditQuery::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));
}
