use super::RepoResult;
use crate::domain::team::Team;
use async_trait::async_trait;
use uuid::Uuid;

/// Repository trait for Team aggregate
///
/// Members and autonomy config are persisted together with the team.
/// Deleting a team never touches its agents.
#[async_trait]
pub trait TeamRepository: Send + Sync {
    /// Save a team (insert or update)
    async fn save(&self, team: &Team) -> RepoResult<()>;

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<Team>>;

    /// All teams of a workspace, newest first
    async fn find_by_workspace(&self, workspace_id: Uuid) -> RepoResult<Vec<Team>>;

    /// Returns false when no such team exists
    async fn delete(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<bool>;
}
