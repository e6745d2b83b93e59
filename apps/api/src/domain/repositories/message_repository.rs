use super::RepoResult;
use crate::domain::message::{Message, MessageFilter, MessageStatus};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository trait for the append-only message log
#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: &Message) -> RepoResult<()>;

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<Message>>;

    /// Messages matching `filter`, newest first, paginated
    async fn list(&self, workspace_id: Uuid, filter: &MessageFilter) -> RepoResult<Vec<Message>>;

    /// Every message of a thread ordered by `created_at`
    async fn find_thread(&self, workspace_id: Uuid, thread_id: Uuid) -> RepoResult<Vec<Message>>;

    /// Moves a message from `from` to `to`; false if it was no longer `from`
    async fn update_status(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        from: MessageStatus,
        to: MessageStatus,
    ) -> RepoResult<bool>;
}
