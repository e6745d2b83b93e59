use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::middleware::AuthContext;
use crate::api::state::AppState;
use crate::domain::execution::{ExecutionSource, ExecutionStatus, WorkflowExecution};
use crate::orchestration::RunReport;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionAction {
    Pause,
    Resume,
    Cancel,
    RetryStep,
}

#[derive(Debug, Deserialize)]
pub struct UpdateExecutionRequest {
    pub action: ExecutionAction,
    pub step_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListExecutionsQuery {
    pub status: Option<ExecutionStatus>,
}

#[derive(Debug, Serialize)]
pub struct ExecutionResponse {
    pub execution: WorkflowExecution,
    /// Present when an objective run was resumed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<RunReport>,
}

/// GET /api/executions
pub async fn list_executions(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListExecutionsQuery>,
) -> Result<Json<Vec<WorkflowExecution>>, ApiError> {
    let executions = state
        .services
        .executions
        .list(auth.workspace_id, query.status)
        .await?;
    Ok(Json(executions))
}

/// GET /api/executions/:id
pub async fn get_execution(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowExecution>, ApiError> {
    let execution = state.services.engine.get(auth.workspace_id, id).await?;
    Ok(Json(execution))
}

/// Pause, resume, cancel, or retry one failed step
///
/// Resuming an objective run hands it back to the orchestrator; every
/// other action goes through the workflow engine.
///
/// PATCH /api/executions/:id
pub async fn update_execution(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateExecutionRequest>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let services = &state.services;
    let (ws, actor) = (auth.workspace_id, auth.user_id);

    let response = match req.action {
        ExecutionAction::Pause => ExecutionResponse {
            execution: services.engine.pause(ws, id, actor).await?,
            run: None,
        },
        ExecutionAction::Cancel => ExecutionResponse {
            execution: services.engine.cancel(ws, id, actor).await?,
            run: None,
        },
        ExecutionAction::RetryStep => {
            let step_id = req
                .step_id
                .as_deref()
                .ok_or_else(|| ApiError::bad_request("step_id is required for retry_step"))?;
            ExecutionResponse {
                execution: services.engine.retry_step(ws, id, step_id, actor).await?,
                run: None,
            }
        }
        ExecutionAction::Resume => {
            let current = services.engine.get(ws, id).await?;
            match current.source() {
                ExecutionSource::Workflow { .. } => ExecutionResponse {
                    execution: services.engine.resume(ws, id, actor).await?,
                    run: None,
                },
                ExecutionSource::Objective { .. } => {
                    let report = services.orchestrator.resume_run(ws, id, actor).await?;
                    ExecutionResponse {
                        execution: services.engine.get(ws, id).await?,
                        run: Some(report),
                    }
                }
            }
        }
    };

    Ok(Json(response))
}
