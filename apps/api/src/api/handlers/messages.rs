use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::middleware::AuthContext;
use crate::api::state::AppState;
use crate::domain::message::{Message, MessageContent, MessageFilter, MessageType, NewMessage, Recipient};
use crate::orchestration::{BroadcastReport, BroadcastRequest};

/// Request body for a point-to-point message
///
/// Exactly one of `to_agent_id` and `team_id` must be set.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub from_agent_id: Option<Uuid>,
    pub to_agent_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub message_type: MessageType,
    pub content: MessageContent,
    pub parent_message_id: Option<Uuid>,
    pub thread_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastMessageRequest {
    pub from_agent_id: Option<Uuid>,
    pub message_type: MessageType,
    pub content: MessageContent,
    pub thread_id: Option<Uuid>,
}

/// POST /api/messages
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let recipient = Recipient::from_parts(req.to_agent_id, req.team_id).map_err(ApiError::bad_request)?;
    let new = NewMessage {
        from_agent_id: req.from_agent_id,
        parent_message_id: req.parent_message_id,
        thread_id: req.thread_id,
        ..NewMessage::new(recipient, req.message_type, req.content)
    };

    let message = state.services.bus.send(auth.workspace_id, new).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Fan a message out to every active member of a team
///
/// POST /api/teams/:id/broadcast
pub async fn broadcast_message(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(team_id): Path<Uuid>,
    Json(req): Json<BroadcastMessageRequest>,
) -> Result<(StatusCode, Json<BroadcastReport>), ApiError> {
    let report = state
        .services
        .bus
        .broadcast(
            auth.workspace_id,
            team_id,
            BroadcastRequest {
                from_agent_id: req.from_agent_id,
                message_type: req.message_type,
                content: req.content,
                thread_id: req.thread_id,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(report)))
}

/// GET /api/messages
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(filter): Query<MessageFilter>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.services.bus.list(auth.workspace_id, &filter).await?;
    Ok(Json(messages))
}

/// GET /api/messages/threads/:thread_id
pub async fn get_thread(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(thread_id): Path<Uuid>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state.services.bus.thread(auth.workspace_id, thread_id).await?;
    Ok(Json(messages))
}

/// POST /api/messages/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Message>, ApiError> {
    let message = state.services.bus.mark_read(auth.workspace_id, id).await?;
    Ok(Json(message))
}
