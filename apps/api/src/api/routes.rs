use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{agents, approvals, audit, executions, health, messages, teams, workflows};
use super::state::AppState;

/// Builds the HTTP router over the orchestration services
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Agents
        .route("/api/agents", post(agents::create_agent).get(agents::list_agents))
        .route("/api/agents/:id", patch(agents::update_agent_status))
        // Teams
        .route("/api/teams", post(teams::create_team).get(teams::list_teams))
        .route("/api/teams/:id", get(teams::get_team).delete(teams::delete_team))
        .route("/api/teams/:id/members", post(teams::add_member))
        .route("/api/teams/:id/autonomy", put(teams::update_autonomy))
        .route("/api/teams/:id/members/:agent_id", delete(teams::remove_member))
        .route("/api/teams/:id/run", post(teams::run_team))
        .route("/api/teams/:id/broadcast", post(messages::broadcast_message))
        // Workflows
        .route(
            "/api/workflows",
            post(workflows::create_workflow).get(workflows::list_workflows),
        )
        .route(
            "/api/workflows/:id",
            get(workflows::get_workflow).put(workflows::update_workflow),
        )
        .route("/api/workflows/:id/executions", post(workflows::start_workflow))
        // Executions
        .route("/api/executions", get(executions::list_executions))
        .route(
            "/api/executions/:id",
            get(executions::get_execution).patch(executions::update_execution),
        )
        // Messages
        .route("/api/messages", post(messages::send_message).get(messages::list_messages))
        .route("/api/messages/threads/:thread_id", get(messages::get_thread))
        .route("/api/messages/:id/read", post(messages::mark_read))
        // Approvals
        .route("/api/approvals", get(approvals::list_approvals))
        .route("/api/approvals/:id/approve", post(approvals::approve))
        .route("/api/approvals/:id/reject", post(approvals::reject))
        // Audit
        .route("/api/audit", get(audit::list_audit_log))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // Shared state
        .with_state(state)
}
