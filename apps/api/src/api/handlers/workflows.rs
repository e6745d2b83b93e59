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
use crate::domain::execution::WorkflowExecution;
use crate::domain::workflow::{Step, Workflow};

/// Request body for authoring a workflow
#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    pub team_id: Option<Uuid>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkflowRequest {
    pub name: Option<String>,
    pub steps: Vec<Step>,
}

/// POST /api/workflows
pub async fn create_workflow(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<CreateWorkflowRequest>,
) -> Result<(StatusCode, Json<Workflow>), ApiError> {
    let repos = &state.services.repos;

    if let Some(team_id) = req.team_id {
        repos
            .teams
            .find_by_id(auth.workspace_id, team_id)
            .await
            .map_err(|e| ApiError::internal_server_error(format!("Failed to fetch team: {}", e)))?
            .ok_or_else(|| ApiError::not_found(format!("Team not found: {}", team_id)))?;
    }
    let workflow = Workflow::new(auth.workspace_id, req.team_id, req.name, req.steps, auth.user_id)
        .map_err(ApiError::bad_request)?;
    require_agents(&state, &workflow).await?;

    repos
        .workflows
        .save(&workflow)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to save workflow: {}", e)))?;

    Ok((StatusCode::CREATED, Json(workflow)))
}

/// GET /api/workflows
pub async fn list_workflows(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<Workflow>>, ApiError> {
    let workflows = state
        .services
        .repos
        .workflows
        .find_by_workspace(auth.workspace_id)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to fetch workflows: {}", e)))?;
    Ok(Json(workflows))
}

/// GET /api/workflows/:id
pub async fn get_workflow(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Workflow>, ApiError> {
    Ok(Json(load_workflow(&state, auth.workspace_id, id).await?))
}

/// Edit a workflow
///
/// Versions that an execution already references are immutable: editing
/// one creates the next version instead. Returns the version that holds
/// the edit.
///
/// PUT /api/workflows/:id
pub async fn update_workflow(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateWorkflowRequest>,
) -> Result<Json<Workflow>, ApiError> {
    let repos = &state.services.repos;
    let mut workflow = load_workflow(&state, auth.workspace_id, id).await?;

    let referenced = repos
        .executions
        .count_by_workflow(auth.workspace_id, id)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to count executions: {}", e)))?
        > 0;

    let updated = if referenced {
        workflow
            .revise(req.name, req.steps, auth.user_id)
            .map_err(ApiError::bad_request)?
    } else {
        workflow.edit(req.name, req.steps).map_err(ApiError::bad_request)?;
        workflow
    };
    require_agents(&state, &updated).await?;

    repos
        .workflows
        .save(&updated)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to save workflow: {}", e)))?;

    tracing::info!(workflow_id = %updated.id, version = updated.version, referenced, "workflow updated");
    Ok(Json(updated))
}

/// Start an execution and drive it until it finishes or parks
///
/// POST /api/workflows/:id/executions
pub async fn start_workflow(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<WorkflowExecution>), ApiError> {
    let execution = state.services.engine.start(auth.workspace_id, id).await?;
    Ok((StatusCode::CREATED, Json(execution)))
}

async fn load_workflow(state: &AppState, workspace_id: Uuid, id: Uuid) -> Result<Workflow, ApiError> {
    state
        .services
        .repos
        .workflows
        .find_by_id(workspace_id, id)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to fetch workflow: {}", e)))?
        .ok_or_else(|| ApiError::not_found(format!("Workflow not found: {}", id)))
}

/// Every step must name an agent of the workspace
async fn require_agents(state: &AppState, workflow: &Workflow) -> Result<(), ApiError> {
    let ids: Vec<Uuid> = workflow.agent_ids().into_iter().collect();
    let found = state
        .services
        .repos
        .agents
        .find_many(workflow.workspace_id, &ids)
        .await
        .map_err(|e| ApiError::internal_server_error(format!("Failed to fetch agents: {}", e)))?;

    match ids.iter().find(|id| !found.iter().any(|a| a.id == **id)) {
        Some(missing) => Err(ApiError::not_found(format!("Agent not found: {}", missing))),
        None => Ok(()),
    }
}
