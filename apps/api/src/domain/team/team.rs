use super::events::TeamEvent;
use super::value_objects::{AutonomyConfig, MemberRole};
use crate::domain::workflow::StepAction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Membership record linking an agent to a team
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub agent_id: Uuid,
    pub role: MemberRole,
    /// Higher values are offered work first
    pub priority: i32,
}

/// Team aggregate root
///
/// A named grouping of agents sharing one autonomy policy. The team only
/// references its agents; removing a member or deleting the team never
/// deletes an agent.
///
/// # Invariants
/// - Name and department cannot be empty
/// - An agent appears at most once in the member list
/// - At most one member holds the coordinator role, and `coordinator_id`
///   always points at that member
/// - The autonomy config is valid
///
/// # Example
/// ```
/// use ghostpirates_orchestrator::domain::team::{MemberRole, Team};
/// use ghostpirates_orchestrator::domain::team::value_objects::AutonomyConfig;
/// use uuid::Uuid;
///
/// let (mut team, events) = Team::new(
///     Uuid::new_v4(),
///     "Growth".to_string(),
///     "marketing".to_string(),
///     Uuid::new_v4(),
///     AutonomyConfig::default(),
/// ).expect("valid team");
///
/// let coordinator = Uuid::new_v4();
/// team.add_member(coordinator, MemberRole::Coordinator, 10).expect("first coordinator");
///
/// assert_eq!(team.coordinator_id(), Some(coordinator));
/// assert!(!events.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Team {
    id: Uuid,
    workspace_id: Uuid,
    name: String,
    department: String,
    coordinator_id: Option<Uuid>,
    members: Vec<TeamMember>,
    autonomy: AutonomyConfig,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Team {
    /// Creates a new Team aggregate with no members
    ///
    /// # Returns
    /// * `Ok((Team, Vec<TeamEvent>))` - New team and events generated
    /// * `Err(String)` - If any invariant is violated
    pub fn new(
        workspace_id: Uuid,
        name: String,
        department: String,
        created_by: Uuid,
        autonomy: AutonomyConfig,
    ) -> Result<(Self, Vec<TeamEvent>), String> {
        if name.trim().is_empty() {
            return Err("Team name cannot be empty".to_string());
        }
        if department.trim().is_empty() {
            return Err("Department cannot be empty".to_string());
        }
        autonomy.validate()?;

        let now = Utc::now();
        let team = Self {
            id: Uuid::new_v4(),
            workspace_id,
            name: name.trim().to_string(),
            department: department.trim().to_lowercase(),
            coordinator_id: None,
            members: Vec::new(),
            autonomy,
            created_by,
            created_at: now,
            updated_at: now,
        };

        let events = vec![TeamEvent::Created {
            team_id: team.id,
            workspace_id: team.workspace_id,
            name: team.name.clone(),
            created_by: team.created_by,
        }];

        Ok((team, events))
    }

    /// Adds an agent to the team
    ///
    /// # Business Rules
    /// - The agent must not already be a member
    /// - Only one coordinator per team
    pub fn add_member(&mut self, agent_id: Uuid, role: MemberRole, priority: i32) -> Result<TeamEvent, String> {
        if self.is_member(agent_id) {
            return Err(format!("Agent {} is already a member of this team", agent_id));
        }
        if role == MemberRole::Coordinator {
            if let Some(existing) = self.coordinator_id {
                return Err(format!("Team already has coordinator {}", existing));
            }
            self.coordinator_id = Some(agent_id);
        }

        self.members.push(TeamMember {
            agent_id,
            role,
            priority,
        });
        self.updated_at = Utc::now();

        Ok(TeamEvent::MemberAdded {
            team_id: self.id,
            agent_id,
            role,
        })
    }

    /// Removes an agent from the team; the agent itself is untouched
    pub fn remove_member(&mut self, agent_id: Uuid) -> Result<TeamEvent, String> {
        let before = self.members.len();
        self.members.retain(|m| m.agent_id != agent_id);
        if self.members.len() == before {
            return Err(format!("Agent {} is not a member of this team", agent_id));
        }
        if self.coordinator_id == Some(agent_id) {
            self.coordinator_id = None;
        }
        self.updated_at = Utc::now();

        Ok(TeamEvent::MemberRemoved {
            team_id: self.id,
            agent_id,
        })
    }

    /// Replaces the autonomy policy
    pub fn update_autonomy(&mut self, autonomy: AutonomyConfig) -> Result<TeamEvent, String> {
        autonomy.validate()?;
        self.autonomy = autonomy;
        self.updated_at = Utc::now();
        Ok(TeamEvent::AutonomyUpdated { team_id: self.id })
    }

    pub fn is_member(&self, agent_id: Uuid) -> bool {
        self.members.iter().any(|m| m.agent_id == agent_id)
    }

    pub fn requires_approval(&self, action: StepAction) -> bool {
        self.autonomy.requires_approval(action)
    }

    /// Specialists ordered by descending priority
    pub fn specialists(&self) -> Vec<&TeamMember> {
        let mut specialists: Vec<_> = self
            .members
            .iter()
            .filter(|m| m.role == MemberRole::Specialist)
            .collect();
        specialists.sort_by(|a, b| b.priority.cmp(&a.priority));
        specialists
    }

    // ===== Getters =====

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn workspace_id(&self) -> Uuid {
        self.workspace_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn department(&self) -> &str {
        &self.department
    }

    pub fn coordinator_id(&self) -> Option<Uuid> {
        self.coordinator_id
    }

    pub fn members(&self) -> &[TeamMember] {
        &self.members
    }

    pub fn autonomy(&self) -> &AutonomyConfig {
        &self.autonomy
    }

    pub fn created_by(&self) -> Uuid {
        self.created_by
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Reconstructs a Team from persistence layer data
    ///
    /// Bypasses business rule validation since the data was validated
    /// before it was stored. Only for repository implementations.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persistence(
        id: Uuid,
        workspace_id: Uuid,
        name: String,
        department: String,
        coordinator_id: Option<Uuid>,
        members: Vec<TeamMember>,
        autonomy: AutonomyConfig,
        created_by: Uuid,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            workspace_id,
            name,
            department,
            coordinator_id,
            members,
            autonomy,
            created_by,
            created_at,
            updated_at,
        }
    }
}
