use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::repositories::{RepoResult, TeamRepository};
use crate::domain::team::{AutonomyConfig, Team, TeamMember};

#[derive(sqlx::FromRow)]
struct TeamRow {
    id: Uuid,
    workspace_id: Uuid,
    name: String,
    department: String,
    coordinator_id: Option<Uuid>,
    members: Json<Vec<TeamMember>>,
    autonomy: Json<AutonomyConfig>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TeamRow> for Team {
    fn from(r: TeamRow) -> Self {
        Team::from_persistence(
            r.id,
            r.workspace_id,
            r.name,
            r.department,
            r.coordinator_id,
            r.members.0,
            r.autonomy.0,
            r.created_by,
            r.created_at,
            r.updated_at,
        )
    }
}

const SELECT_TEAM: &str = r#"
    SELECT id, workspace_id, name, department, coordinator_id, members, autonomy,
           created_by, created_at, updated_at
    FROM teams
"#;

/// PostgreSQL implementation of TeamRepository
///
/// Members and autonomy config are value objects of the team and are
/// stored as jsonb columns on the team row.
pub struct PostgresTeamRepository {
    pool: PgPool,
}

impl PostgresTeamRepository {
    /// Creates a new PostgresTeamRepository
    ///
    /// # Arguments
    /// * `pool` - SQLx connection pool for PostgreSQL
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TeamRepository for PostgresTeamRepository {
    async fn save(&self, team: &Team) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO teams (
                id, workspace_id, name, department, coordinator_id,
                members, autonomy, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                department = EXCLUDED.department,
                coordinator_id = EXCLUDED.coordinator_id,
                members = EXCLUDED.members,
                autonomy = EXCLUDED.autonomy,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(team.id())
        .bind(team.workspace_id())
        .bind(team.name())
        .bind(team.department())
        .bind(team.coordinator_id())
        .bind(Json(team.members()))
        .bind(Json(team.autonomy()))
        .bind(team.created_by())
        .bind(team.created_at())
        .bind(team.updated_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<Team>> {
        let row = sqlx::query_as::<_, TeamRow>(&format!("{SELECT_TEAM} WHERE id = $1 AND workspace_id = $2"))
            .bind(id)
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Team::from))
    }

    async fn find_by_workspace(&self, workspace_id: Uuid) -> RepoResult<Vec<Team>> {
        let rows = sqlx::query_as::<_, TeamRow>(&format!(
            "{SELECT_TEAM} WHERE workspace_id = $1 ORDER BY created_at DESC"
        ))
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Team::from).collect())
    }

    async fn delete(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<bool> {
        let result = sqlx::query("DELETE FROM teams WHERE id = $1 AND workspace_id = $2")
            .bind(id)
            .bind(workspace_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
