use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::middleware::AuthContext;
use crate::api::state::AppState;
use crate::domain::message::Priority;
use crate::domain::team::{AutonomyConfig, MemberRole, Team, TeamEvent, TeamMember};
use crate::orchestration::{ActivityBroadcaster, ActivityEvent, RunReport};

/// One member in a create-team request
#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub agent_id: Uuid,
    pub role: MemberRole,
    #[serde(default)]
    pub priority: i32,
}

/// Request body for creating a team
#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub department: String,
    #[serde(default)]
    pub autonomy: AutonomyConfig,
    #[serde(default)]
    pub members: Vec<MemberRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RunTeamRequest {
    pub objective: String,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Serialize)]
pub struct TeamResponse {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub department: String,
    pub coordinator_id: Option<Uuid>,
    pub members: Vec<TeamMember>,
    pub autonomy: AutonomyConfig,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Team> for TeamResponse {
    fn from(team: &Team) -> Self {
        Self {
            id: team.id(),
            workspace_id: team.workspace_id(),
            name: team.name().to_string(),
            department: team.department().to_string(),
            coordinator_id: team.coordinator_id(),
            members: team.members().to_vec(),
            autonomy: team.autonomy().clone(),
            created_by: team.created_by(),
            created_at: team.created_at(),
            updated_at: team.updated_at(),
        }
    }
}

/// Create a new team
///
/// POST /api/teams
pub async fn create_team(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateTeamRequest>,
) -> Result<(StatusCode, Json<TeamResponse>), ApiError> {
    let repos = &state.services.repos;

    let (mut team, mut events) = Team::new(auth.workspace_id, req.name, req.department, auth.user_id, req.autonomy)
        .map_err(ApiError::bad_request)?;

    for member in req.members {
        repos
            .agents
            .find_by_id(auth.workspace_id, member.agent_id)
            .await
            .map_err(|e| ApiError::internal_server_error(format!("Failed to load agent: {}", e)))?
            .ok_or_else(|| ApiError::not_found(format!("Agent not found: {}", member.agent_id)))?;
        events.push(
            team.add_member(member.agent_id, member.role, member.priority)
                .map_err(ApiError::bad_request)?,
        );
    }

    repos
        .teams
        .save(&team)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to save team: {}", e)))?;
    publish(&state, auth.workspace_id, events);

    tracing::info!(team_id = %team.id(), members = team.members().len(), "team created");
    Ok((StatusCode::CREATED, Json(TeamResponse::from(&team))))
}

/// List the workspace's teams
///
/// GET /api/teams
pub async fn list_teams(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<TeamResponse>>, ApiError> {
    let teams = state
        .services
        .repos
        .teams
        .find_by_workspace(auth.workspace_id)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to fetch teams: {}", e)))?;

    Ok(Json(teams.iter().map(TeamResponse::from).collect()))
}

/// Get a team by ID
///
/// GET /api/teams/:id
pub async fn get_team(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<TeamResponse>, ApiError> {
    let team = load_team(&state, auth.workspace_id, id).await?;
    Ok(Json(TeamResponse::from(&team)))
}

/// Delete a team; its agents are kept
///
/// DELETE /api/teams/:id
pub async fn delete_team(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .services
        .repos
        .teams
        .delete(auth.workspace_id, id)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to delete team: {}", e)))?;

    if !deleted {
        return Err(ApiError::not_found(format!("Team not found: {}", id)));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Add an agent to a team
///
/// POST /api/teams/:id/members
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<MemberRequest>,
) -> Result<Json<TeamResponse>, ApiError> {
    let repos = &state.services.repos;
    let mut team = load_team(&state, auth.workspace_id, id).await?;

    repos
        .agents
        .find_by_id(auth.workspace_id, req.agent_id)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to load agent: {}", e)))?
        .ok_or_else(|| ApiError::not_found(format!("Agent not found: {}", req.agent_id)))?;
    let event = team
        .add_member(req.agent_id, req.role, req.priority)
        .map_err(ApiError::bad_request)?;

    repos
        .teams
        .save(&team)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to save team: {}", e)))?;
    publish(&state, auth.workspace_id, [event]);
    Ok(Json(TeamResponse::from(&team)))
}

/// Remove an agent from a team
///
/// DELETE /api/teams/:id/members/:agent_id
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((id, agent_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<TeamResponse>, ApiError> {
    let mut team = load_team(&state, auth.workspace_id, id).await?;
    let event = team.remove_member(agent_id).map_err(ApiError::bad_request)?;

    state
        .services
        .repos
        .teams
        .save(&team)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to save team: {}", e)))?;
    publish(&state, auth.workspace_id, [event]);
    Ok(Json(TeamResponse::from(&team)))
}

/// Replace a team's autonomy policy
///
/// PUT /api/teams/:id/autonomy
pub async fn update_autonomy(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(autonomy): Json<AutonomyConfig>,
) -> Result<Json<TeamResponse>, ApiError> {
    let mut team = load_team(&state, auth.workspace_id, id).await?;
    let event = team.update_autonomy(autonomy).map_err(ApiError::bad_request)?;

    state
        .services
        .repos
        .teams
        .save(&team)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to save team: {}", e)))?;
    publish(&state, auth.workspace_id, [event]);

    tracing::info!(team_id = %team.id(), user_id = %auth.user_id, "team autonomy updated");
    Ok(Json(TeamResponse::from(&team)))
}

/// Run a team against an objective
///
/// POST /api/teams/:id/run
pub async fn run_team(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<RunTeamRequest>,
) -> Result<Json<RunReport>, ApiError> {
    let report = state
        .services
        .orchestrator
        .run_team(auth.workspace_id, id, &req.objective, req.priority)
        .await?;
    Ok(Json(report))
}

/// Announces saved team changes on the activity stream
fn publish(state: &AppState, workspace_id: Uuid, events: impl IntoIterator<Item = TeamEvent>) {
    for change in events {
        state
            .services
            .broadcaster
            .publish(ActivityEvent::TeamChanged { workspace_id, change });
    }
}

async fn load_team(state: &AppState, workspace_id: Uuid, id: Uuid) -> Result<Team, ApiError> {
    state
        .services
        .repos
        .teams
        .find_by_id(workspace_id, id)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to fetch team: {}", e)))?
        .ok_or_else(|| ApiError::not_found(format!("Team not found: {}", id)))
}
