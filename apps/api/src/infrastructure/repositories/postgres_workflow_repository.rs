use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::repositories::{RepoResult, WorkflowRepository};
use crate::domain::workflow::{Step, Workflow};

#[derive(sqlx::FromRow)]
struct WorkflowRow {
    id: Uuid,
    workspace_id: Uuid,
    team_id: Option<Uuid>,
    name: String,
    version: i32,
    previous_version_id: Option<Uuid>,
    steps: Json<Vec<Step>>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
}

impl From<WorkflowRow> for Workflow {
    fn from(r: WorkflowRow) -> Self {
        Workflow {
            id: r.id,
            workspace_id: r.workspace_id,
            team_id: r.team_id,
            name: r.name,
            version: r.version,
            previous_version_id: r.previous_version_id,
            steps: r.steps.0,
            created_by: r.created_by,
            created_at: r.created_at,
        }
    }
}

const SELECT_WORKFLOW: &str = r#"
    SELECT id, workspace_id, team_id, name, version, previous_version_id, steps, created_by, created_at
    FROM workflows
"#;

/// PostgreSQL implementation of WorkflowRepository
pub struct PostgresWorkflowRepository {
    pool: PgPool,
}

impl PostgresWorkflowRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowRepository for PostgresWorkflowRepository {
    async fn save(&self, workflow: &Workflow) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO workflows (
                id, workspace_id, team_id, name, version, previous_version_id, steps, created_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                team_id = EXCLUDED.team_id,
                name = EXCLUDED.name,
                steps = EXCLUDED.steps
            "#,
        )
        .bind(workflow.id)
        .bind(workflow.workspace_id)
        .bind(workflow.team_id)
        .bind(&workflow.name)
        .bind(workflow.version)
        .bind(workflow.previous_version_id)
        .bind(Json(&workflow.steps))
        .bind(workflow.created_by)
        .bind(workflow.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<Workflow>> {
        let row = sqlx::query_as::<_, WorkflowRow>(&format!(
            "{SELECT_WORKFLOW} WHERE id = $1 AND workspace_id = $2"
        ))
        .bind(id)
        .bind(workspace_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Workflow::from))
    }

    async fn find_by_workspace(&self, workspace_id: Uuid) -> RepoResult<Vec<Workflow>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            "{SELECT_WORKFLOW} WHERE workspace_id = $1 ORDER BY created_at DESC"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Workflow::from).collect())
    }
}
