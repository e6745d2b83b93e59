use axum::{
    extract::{Query, State},
    Json,
};

use crate::api::errors::ApiError;
use crate::api::middleware::AuthContext;
use crate::api::state::AppState;
use crate::domain::audit::{AuditLogEntry, AuditQuery};

/// GET /api/audit
pub async fn list_audit_log(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditLogEntry>>, ApiError> {
    let entries = state.services.ledger.query(auth.workspace_id, &query).await?;
    Ok(Json(entries))
}
