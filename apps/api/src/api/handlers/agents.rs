use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::middleware::AuthContext;
use crate::api::state::AppState;
use crate::domain::agent::{Agent, AgentStatus};

/// Request body for registering an agent
#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub capability: String,
    pub instructions: Option<String>,
    /// Start in `active` instead of `draft`
    #[serde(default)]
    pub activate: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAgentStatusRequest {
    pub status: AgentStatus,
}

/// Register an agent in the caller's workspace
///
/// POST /api/agents
pub async fn create_agent(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateAgentRequest>,
) -> Result<(StatusCode, Json<Agent>), ApiError> {
    let mut agent = Agent::new(auth.workspace_id, req.name, req.capability).map_err(ApiError::bad_request)?;
    if let Some(instructions) = req.instructions {
        agent = agent.with_instructions(instructions);
    }
    if req.activate {
        agent.activate().map_err(ApiError::bad_request)?;
    }

    state
        .services
        .repos
        .agents
        .save(&agent)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to save agent: {}", e)))?;

    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /api/agents
pub async fn list_agents(State(state): State<AppState>, auth: AuthContext) -> Result<Json<Vec<Agent>>, ApiError> {
    let agents = state
        .services
        .repos
        .agents
        .find_by_workspace(auth.workspace_id)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to fetch agents: {}", e)))?;
    Ok(Json(agents))
}

/// Move an agent along its lifecycle
///
/// PATCH /api/agents/:id
pub async fn update_agent_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateAgentStatusRequest>,
) -> Result<Json<Agent>, ApiError> {
    let repos = &state.services.repos;
    let mut agent = repos
        .agents
        .find_by_id(auth.workspace_id, id)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to fetch agent: {}", e)))?
        .ok_or_else(|| ApiError::not_found(format!("Agent not found: {}", id)))?;

    agent.transition(req.status).map_err(ApiError::bad_request)?;
    repos
        .agents
        .save(&agent)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to save agent: {}", e)))?;

    Ok(Json(agent))
}
