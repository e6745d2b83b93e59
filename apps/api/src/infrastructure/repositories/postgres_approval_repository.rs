use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::approval::{ApprovalRequest, ApprovalStatus, DecisionRecord};
use crate::domain::repositories::{ApprovalRepository, RepoResult, RepositoryError};
use crate::domain::workflow::StepAction;

#[derive(sqlx::FromRow)]
struct ApprovalRow {
    id: Uuid,
    workspace_id: Uuid,
    execution_id: Uuid,
    step_id: String,
    action: String,
    waitpoint_token: Uuid,
    status: ApprovalStatus,
    decision: Option<Json<DecisionRecord>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ApprovalRow> for ApprovalRequest {
    type Error = RepositoryError;

    fn try_from(r: ApprovalRow) -> Result<Self, Self::Error> {
        let action: StepAction = r
            .action
            .parse()
            .map_err(|e| RepositoryError::Corrupt(format!("approval {}: {}", r.id, e)))?;

        Ok(ApprovalRequest {
            id: r.id,
            workspace_id: r.workspace_id,
            execution_id: r.execution_id,
            step_id: r.step_id,
            action,
            waitpoint_token: r.waitpoint_token,
            status: r.status,
            decision: r.decision.map(|d| d.0),
            created_at: r.created_at,
        })
    }
}

fn into_requests(rows: Vec<ApprovalRow>) -> RepoResult<Vec<ApprovalRequest>> {
    rows.into_iter().map(ApprovalRequest::try_from).collect()
}

const SELECT_APPROVAL: &str = r#"
    SELECT id, workspace_id, execution_id, step_id, action, waitpoint_token, status, decision, created_at
    FROM approval_requests
"#;

/// PostgreSQL implementation of ApprovalRepository
pub struct PostgresApprovalRepository {
    pool: PgPool,
}

impl PostgresApprovalRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalRepository for PostgresApprovalRepository {
    async fn insert(&self, request: &ApprovalRequest) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO approval_requests (
                id, workspace_id, execution_id, step_id, action, waitpoint_token, status, decision, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(request.id)
        .bind(request.workspace_id)
        .bind(request.execution_id)
        .bind(&request.step_id)
        .bind(request.action.as_str())
        .bind(request.waitpoint_token)
        .bind(request.status)
        .bind(request.decision.as_ref().map(Json))
        .bind(request.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<ApprovalRequest>> {
        let row = sqlx::query_as::<_, ApprovalRow>(&format!(
            "{SELECT_APPROVAL} WHERE id = $1 AND workspace_id = $2"
        ))
        .bind(id)
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ApprovalRequest::try_from).transpose()
    }

    async fn find_latest_for_step(
        &self,
        workspace_id: Uuid,
        execution_id: Uuid,
        step_id: &str,
    ) -> RepoResult<Option<ApprovalRequest>> {
        let row = sqlx::query_as::<_, ApprovalRow>(&format!(
            "{SELECT_APPROVAL} WHERE workspace_id = $1 AND execution_id = $2 AND step_id = $3 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(workspace_id)
        .bind(execution_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ApprovalRequest::try_from).transpose()
    }

    async fn resolve(&self, request: &ApprovalRequest) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE approval_requests SET status = $1, decision = $2
            WHERE id = $3 AND workspace_id = $4 AND status = 'pending'
            "#,
        )
        .bind(request.status)
        .bind(request.decision.as_ref().map(Json))
        .bind(request.id)
        .bind(request.workspace_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_pending(&self, workspace_id: Uuid) -> RepoResult<Vec<ApprovalRequest>> {
        let rows = sqlx::query_as::<_, ApprovalRow>(&format!(
            "{SELECT_APPROVAL} WHERE workspace_id = $1 AND status = 'pending' ORDER BY created_at"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        into_requests(rows)
    }

    async fn find_by_execution(&self, workspace_id: Uuid, execution_id: Uuid) -> RepoResult<Vec<ApprovalRequest>> {
        let rows = sqlx::query_as::<_, ApprovalRow>(&format!(
            "{SELECT_APPROVAL} WHERE workspace_id = $1 AND execution_id = $2 ORDER BY created_at"
        ))
        .bind(workspace_id)
        .bind(execution_id)
        .fetch_all(&self.pool)
        .await?;

        into_requests(rows)
    }
}
