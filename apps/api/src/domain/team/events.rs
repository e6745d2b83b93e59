use super::value_objects::MemberRole;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Domain events that occur within the Team aggregate
///
/// The team handlers publish them on the activity stream as
/// `ActivityEvent::TeamChanged` so connected clients can follow membership
/// and policy changes.
///
/// # Example
/// ```
/// use ghostpirates_orchestrator::domain::team::events::TeamEvent;
/// use uuid::Uuid;
///
/// let event = TeamEvent::Created {
///     team_id: Uuid::new_v4(),
///     workspace_id: Uuid::new_v4(),
///     name: "Growth".to_string(),
///     created_by: Uuid::new_v4(),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TeamEvent {
    /// Fired when a team is created
    Created {
        team_id: Uuid,
        workspace_id: Uuid,
        name: String,
        created_by: Uuid,
    },
    /// Fired when an agent joins the team
    MemberAdded {
        team_id: Uuid,
        agent_id: Uuid,
        role: MemberRole,
    },
    /// Fired when an agent leaves the team
    MemberRemoved { team_id: Uuid, agent_id: Uuid },
    /// Fired when the autonomy policy changes
    AutonomyUpdated { team_id: Uuid },
}

impl TeamEvent {
    /// Returns the team_id for this event
    pub fn team_id(&self) -> Uuid {
        match self {
            TeamEvent::Created { team_id, .. } => *team_id,
            TeamEvent::MemberAdded { team_id, .. } => *team_id,
            TeamEvent::MemberRemoved { team_id, .. } => *team_id,
            TeamEvent::AutonomyUpdated { team_id } => *team_id,
        }
    }
}
