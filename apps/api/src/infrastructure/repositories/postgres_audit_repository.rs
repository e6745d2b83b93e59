use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::audit::{AuditLogEntry, AuditQuery};
use crate::domain::repositories::{AuditRepository, RepoResult};

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: Uuid,
    workspace_id: Uuid,
    team_id: Option<Uuid>,
    agent_id: Option<Uuid>,
    execution_id: Option<Uuid>,
    action_type: String,
    was_automatic: bool,
    success: bool,
    context: Json<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<AuditRow> for AuditLogEntry {
    fn from(r: AuditRow) -> Self {
        AuditLogEntry {
            id: r.id,
            workspace_id: r.workspace_id,
            team_id: r.team_id,
            agent_id: r.agent_id,
            execution_id: r.execution_id,
            action_type: r.action_type,
            was_automatic: r.was_automatic,
            success: r.success,
            context: r.context.0,
            created_at: r.created_at,
        }
    }
}

/// PostgreSQL implementation of AuditRepository (insert and select only)
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append(&self, entry: &AuditLogEntry) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, workspace_id, team_id, agent_id, execution_id,
                action_type, was_automatic, success, context, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(entry.id)
        .bind(entry.workspace_id)
        .bind(entry.team_id)
        .bind(entry.agent_id)
        .bind(entry.execution_id)
        .bind(&entry.action_type)
        .bind(entry.was_automatic)
        .bind(entry.success)
        .bind(Json(&entry.context))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, workspace_id: Uuid, query: &AuditQuery) -> RepoResult<Vec<AuditLogEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, workspace_id, team_id, agent_id, execution_id,
                   action_type, was_automatic, success, context, created_at
            FROM audit_log
            WHERE workspace_id = $1
              AND ($2::uuid IS NULL OR team_id = $2)
              AND ($3::uuid IS NULL OR agent_id = $3)
              AND ($4::uuid IS NULL OR execution_id = $4)
              AND ($5::text IS NULL OR action_type = $5)
              AND ($6::boolean IS NULL OR was_automatic = $6)
              AND ($7::boolean IS NULL OR success = $7)
              AND ($8::timestamptz IS NULL OR created_at >= $8)
              AND ($9::timestamptz IS NULL OR created_at <= $9)
            ORDER BY created_at DESC
            LIMIT $10 OFFSET $11
            "#,
        )
        .bind(workspace_id)
        .bind(query.team_id)
        .bind(query.agent_id)
        .bind(query.execution_id)
        .bind(&query.action_type)
        .bind(query.was_automatic)
        .bind(query.success)
        .bind(query.from)
        .bind(query.to)
        .bind(i64::from(query.limit()))
        .bind(i64::from(query.offset()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(AuditLogEntry::from).collect())
    }
}
