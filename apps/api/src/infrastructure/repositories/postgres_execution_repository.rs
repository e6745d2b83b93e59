use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::domain::execution::{ExecutionSource, ExecutionStatus, StatusChange, StepResult, WorkflowExecution};
use crate::domain::repositories::{ExecutionRepository, RepoResult};

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: Uuid,
    workspace_id: Uuid,
    source: Json<ExecutionSource>,
    team_id: Option<Uuid>,
    status: ExecutionStatus,
    current_step_id: Option<String>,
    step_results: Json<BTreeMap<String, StepResult>>,
    step_log: Json<Vec<String>>,
    context: Json<Map<String, Value>>,
    history: Json<Vec<StatusChange>>,
    error: Option<String>,
    revision: i64,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl From<ExecutionRow> for WorkflowExecution {
    fn from(r: ExecutionRow) -> Self {
        WorkflowExecution::from_persistence(
            r.id,
            r.workspace_id,
            r.source.0,
            r.team_id,
            r.status,
            r.current_step_id,
            r.step_results.0,
            r.step_log.0,
            r.context.0,
            r.history.0,
            r.error,
            r.revision,
            r.created_at,
            r.started_at,
            r.updated_at,
            r.completed_at,
        )
    }
}

const SELECT_EXECUTION: &str = r#"
    SELECT id, workspace_id, source, team_id, status, current_step_id, step_results,
           step_log, context, history, error, revision,
           created_at, started_at, updated_at, completed_at
    FROM workflow_executions
"#;

/// PostgreSQL implementation of ExecutionRepository
///
/// Status transitions are linearized with `WHERE status = $n AND revision = $m`
/// on every update; no row locks are held between statements.
pub struct PostgresExecutionRepository {
    pool: PgPool,
}

impl PostgresExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for PostgresExecutionRepository {
    async fn insert(&self, execution: &WorkflowExecution) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions (
                id, workspace_id, source, workflow_id, team_id, status, current_step_id,
                step_results, step_log, context, history, error, revision,
                created_at, started_at, updated_at, completed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(execution.id())
        .bind(execution.workspace_id())
        .bind(Json(execution.source()))
        .bind(execution.workflow_id())
        .bind(execution.team_id())
        .bind(execution.status())
        .bind(execution.current_step_id())
        .bind(Json(execution.step_results()))
        .bind(Json(execution.step_log()))
        .bind(Json(execution.context()))
        .bind(Json(execution.history()))
        .bind(execution.error())
        .bind(execution.revision())
        .bind(execution.created_at())
        .bind(execution.started_at())
        .bind(execution.updated_at())
        .bind(execution.completed_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<WorkflowExecution>> {
        let row = sqlx::query_as::<_, ExecutionRow>(&format!(
            "{SELECT_EXECUTION} WHERE id = $1 AND workspace_id = $2"
        ))
        .bind(id)
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(WorkflowExecution::from))
    }

    async fn compare_and_set(
        &self,
        execution: &WorkflowExecution,
        expected_status: ExecutionStatus,
    ) -> RepoResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions SET
                status = $1,
                current_step_id = $2,
                step_results = $3,
                step_log = $4,
                context = $5,
                history = $6,
                error = $7,
                started_at = $8,
                updated_at = $9,
                completed_at = $10,
                revision = revision + 1
            WHERE id = $11 AND workspace_id = $12 AND status = $13 AND revision = $14
            "#,
        )
        .bind(execution.status())
        .bind(execution.current_step_id())
        .bind(Json(execution.step_results()))
        .bind(Json(execution.step_log()))
        .bind(Json(execution.context()))
        .bind(Json(execution.history()))
        .bind(execution.error())
        .bind(execution.started_at())
        .bind(execution.updated_at())
        .bind(execution.completed_at())
        .bind(execution.id())
        .bind(execution.workspace_id())
        .bind(expected_status)
        .bind(execution.revision())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn count_by_workflow(&self, workspace_id: Uuid, workflow_id: Uuid) -> RepoResult<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM workflow_executions WHERE workspace_id = $1 AND workflow_id = $2",
        )
        .bind(workspace_id)
        .bind(workflow_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.max(0) as u64)
    }

    async fn find_by_workspace(
        &self,
        workspace_id: Uuid,
        status: Option<ExecutionStatus>,
    ) -> RepoResult<Vec<WorkflowExecution>> {
        let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
            "{SELECT_EXECUTION} WHERE workspace_id = $1 AND ($2::execution_status IS NULL OR status = $2) \
             ORDER BY created_at DESC"
        ))
        .bind(workspace_id)
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WorkflowExecution::from).collect())
    }
}
