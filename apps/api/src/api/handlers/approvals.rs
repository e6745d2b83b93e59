use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::middleware::AuthContext;
use crate::api::state::AppState;
use crate::domain::approval::{ApprovalDecision, ApprovalRequest};
use crate::domain::execution::WorkflowExecution;
use crate::orchestration::Resolution;

#[derive(Debug, Default, Deserialize)]
pub struct ListApprovalsQuery {
    /// All requests of one execution instead of every pending one
    pub execution_id: Option<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    pub reason: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DecisionResponse {
    pub approval: ApprovalRequest,
    /// The execution after the decision was applied to it
    pub execution: WorkflowExecution,
}

/// GET /api/approvals
pub async fn list_approvals(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListApprovalsQuery>,
) -> Result<Json<Vec<ApprovalRequest>>, ApiError> {
    let approvals = &state.services.approvals;
    let requests = match query.execution_id {
        Some(execution_id) => approvals.for_execution(auth.workspace_id, execution_id).await?,
        None => approvals.pending(auth.workspace_id).await?,
    };
    Ok(Json(requests))
}

/// POST /api/approvals/:id/approve
pub async fn approve(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<ApproveRequest>,
) -> Result<Json<DecisionResponse>, ApiError> {
    decide(
        &state,
        auth,
        id,
        Resolution {
            decision: ApprovalDecision::Approve,
            actor: auth.user_id,
            reason: req.reason,
            metadata: req.metadata,
        },
    )
    .await
}

/// POST /api/approvals/:id/reject
pub async fn reject(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> Result<Json<DecisionResponse>, ApiError> {
    decide(
        &state,
        auth,
        id,
        Resolution {
            decision: ApprovalDecision::Reject,
            actor: auth.user_id,
            reason: req.reason,
            metadata: None,
        },
    )
    .await
}

/// The gate records the decision; the engine then drives the execution
async fn decide(
    state: &AppState,
    auth: AuthContext,
    id: Uuid,
    resolution: Resolution,
) -> Result<Json<DecisionResponse>, ApiError> {
    let services = &state.services;
    let approval = services.approvals.resolve(auth.workspace_id, id, resolution).await?;
    let execution = services.engine.apply_decision(&approval, auth.user_id).await?;
    Ok(Json(DecisionResponse { approval, execution }))
}
