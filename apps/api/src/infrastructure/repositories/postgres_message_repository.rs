use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::message::{Message, MessageContent, MessageFilter, MessageStatus, MessageType, Recipient};
use crate::domain::repositories::{MessageRepository, RepoResult, RepositoryError};

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    workspace_id: Uuid,
    from_agent_id: Option<Uuid>,
    to_agent_id: Option<Uuid>,
    team_id: Option<Uuid>,
    message_type: MessageType,
    content: Json<MessageContent>,
    parent_message_id: Option<Uuid>,
    thread_id: Uuid,
    status: MessageStatus,
    created_at: DateTime<Utc>,
}

impl TryFrom<MessageRow> for Message {
    type Error = RepositoryError;

    fn try_from(r: MessageRow) -> Result<Self, Self::Error> {
        let recipient = Recipient::from_parts(r.to_agent_id, r.team_id)
            .map_err(|e| RepositoryError::Corrupt(format!("message {}: {}", r.id, e)))?;

        Ok(Message {
            id: r.id,
            workspace_id: r.workspace_id,
            from_agent_id: r.from_agent_id,
            recipient,
            message_type: r.message_type,
            content: r.content.0,
            parent_message_id: r.parent_message_id,
            thread_id: r.thread_id,
            status: r.status,
            created_at: r.created_at,
        })
    }
}

fn into_messages(rows: Vec<MessageRow>) -> RepoResult<Vec<Message>> {
    rows.into_iter().map(Message::try_from).collect()
}

const SELECT_MESSAGE: &str = r#"
    SELECT id, workspace_id, from_agent_id, to_agent_id, team_id, message_type, content,
           parent_message_id, thread_id, status, created_at
    FROM messages
"#;

/// PostgreSQL implementation of MessageRepository
pub struct PostgresMessageRepository {
    pool: PgPool,
}

impl PostgresMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn insert(&self, message: &Message) -> RepoResult<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (
                id, workspace_id, from_agent_id, to_agent_id, team_id, message_type, content,
                execution_id, parent_message_id, thread_id, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(message.id)
        .bind(message.workspace_id)
        .bind(message.from_agent_id)
        .bind(message.recipient.agent_id())
        .bind(message.recipient.team_id())
        .bind(message.message_type)
        .bind(Json(&message.content))
        .bind(message.content.execution_id)
        .bind(message.parent_message_id)
        .bind(message.thread_id)
        .bind(message.status)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<Message>> {
        let row = sqlx::query_as::<_, MessageRow>(&format!("{SELECT_MESSAGE} WHERE id = $1 AND workspace_id = $2"))
            .bind(id)
            .bind(workspace_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Message::try_from).transpose()
    }

    async fn list(&self, workspace_id: Uuid, filter: &MessageFilter) -> RepoResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            r#"{SELECT_MESSAGE}
            WHERE workspace_id = $1
              AND ($2::uuid IS NULL OR from_agent_id = $2 OR to_agent_id = $2)
              AND ($3::uuid IS NULL OR team_id = $3)
              AND ($4::uuid IS NULL OR thread_id = $4)
              AND ($5::message_type IS NULL OR message_type = $5)
              AND ($6::message_status IS NULL OR status = $6)
              AND ($7::uuid IS NULL OR execution_id = $7)
            ORDER BY created_at DESC, seq DESC
            LIMIT $8 OFFSET $9"#
        ))
        .bind(workspace_id)
        .bind(filter.agent_id)
        .bind(filter.team_id)
        .bind(filter.thread_id)
        .bind(filter.message_type)
        .bind(filter.status)
        .bind(filter.execution_id)
        .bind(i64::from(filter.limit()))
        .bind(i64::from(filter.offset()))
        .fetch_all(&self.pool)
        .await?;

        into_messages(rows)
    }

    async fn find_thread(&self, workspace_id: Uuid, thread_id: Uuid) -> RepoResult<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(&format!(
            "{SELECT_MESSAGE} WHERE workspace_id = $1 AND thread_id = $2 ORDER BY created_at, seq"
        ))
        .bind(workspace_id)
        .bind(thread_id)
        .fetch_all(&self.pool)
        .await?;

        into_messages(rows)
    }

    async fn update_status(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        from: MessageStatus,
        to: MessageStatus,
    ) -> RepoResult<bool> {
        let result = sqlx::query("UPDATE messages SET status = $1 WHERE id = $2 AND workspace_id = $3 AND status = $4")
            .bind(to)
            .bind(id)
            .bind(workspace_id)
            .bind(from)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
