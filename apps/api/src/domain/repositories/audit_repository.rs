use super::RepoResult;
use crate::domain::audit::{AuditLogEntry, AuditQuery};
use async_trait::async_trait;
use uuid::Uuid;

/// Repository trait for the append-only audit log
///
/// Entries are never updated or deleted.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> RepoResult<()>;

    /// Entries matching `query`, newest first, paginated
    async fn query(&self, workspace_id: Uuid, query: &AuditQuery) -> RepoResult<Vec<AuditLogEntry>>;
}
