use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::agent::{Agent, AgentStatus};
use crate::domain::repositories::{AgentRepository, RepoResult};

#[derive(sqlx::FromRow)]
struct AgentRow {
    id: Uuid,
    workspace_id: Uuid,
    name: String,
    capability: String,
    status: AgentStatus,
    instructions: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AgentRow> for Agent {
    fn from(r: AgentRow) -> Self {
        Agent {
            id: r.id,
            workspace_id: r.workspace_id,
            name: r.name,
            capability: r.capability,
            status: r.status,
            instructions: r.instructions,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const SELECT_AGENT: &str = r#"
    SELECT id, workspace_id, name, capability, status, instructions, created_at, updated_at
    FROM agents
"#;

/// PostgreSQL implementation of AgentRepository
pub struct PostgresAgentRepository {
    pool: PgPool,
}

impl PostgresAgentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AgentRepository for PostgresAgentRepository {
    async fn save(&self, agent: &Agent) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO agents (id, workspace_id, name, capability, status, instructions, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                capability = EXCLUDED.capability,
                status = EXCLUDED.status,
                instructions = EXCLUDED.instructions,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(agent.id)
        .bind(agent.workspace_id)
        .bind(&agent.name)
        .bind(&agent.capability)
        .bind(agent.status)
        .bind(&agent.instructions)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<Agent>> {
        let row = sqlx::query_as::<_, AgentRow>(&format!("{SELECT_AGENT} WHERE id = $1 AND workspace_id = $2"))
            .bind(id)
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Agent::from))
    }

    async fn find_by_workspace(&self, workspace_id: Uuid) -> RepoResult<Vec<Agent>> {
        let rows = sqlx::query_as::<_, AgentRow>(&format!(
            "{SELECT_AGENT} WHERE workspace_id = $1 ORDER BY created_at"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Agent::from).collect())
    }

    async fn find_many(&self, workspace_id: Uuid, ids: &[Uuid]) -> RepoResult<Vec<Agent>> {
        let rows = sqlx::query_as::<_, AgentRow>(&format!(
            "{SELECT_AGENT} WHERE workspace_id = $1 AND id = ANY($2)"
        ))
        .bind(workspace_id)
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Agent::from).collect())
    }
}
