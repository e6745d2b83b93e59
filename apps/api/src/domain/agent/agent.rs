use super::value_objects::AgentStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An autonomous actor capable of performing named actions
///
/// Agents belong to exactly one workspace. Teams and workflow steps hold
/// references to agents by id; deleting a team never touches its agents.
///
/// # Example
/// ```
/// use ghostpirates_orchestrator::domain::agent::{Agent, AgentStatus};
/// use uuid::Uuid;
///
/// let mut agent = Agent::new(Uuid::new_v4(), "Scout".to_string(), "research".to_string())
///     .expect("valid agent");
/// assert_eq!(agent.status, AgentStatus::Draft);
///
/// agent.activate().expect("draft agents can be activated");
/// assert!(agent.is_active());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    /// Capability tag, e.g. "research" or "copywriting"
    pub capability: String,
    pub status: AgentStatus,
    /// Optional persona instructions prepended to every completion
    pub instructions: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// Creates a new agent in `Draft` status
    ///
    /// # Business Rules Enforced
    /// - Name must not be blank
    /// - Capability tag must not be blank
    pub fn new(workspace_id: Uuid, name: String, capability: String) -> Result<Self, String> {
        if name.trim().is_empty() {
            return Err("Agent name cannot be empty".to_string());
        }
        if capability.trim().is_empty() {
            return Err("Agent capability cannot be empty".to_string());
        }

        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            workspace_id,
            name: name.trim().to_string(),
            capability: capability.trim().to_lowercase(),
            status: AgentStatus::Draft,
            instructions: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Sets persona instructions for the agent
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn activate(&mut self) -> Result<(), String> {
        self.transition(AgentStatus::Active)
    }

    pub fn pause(&mut self) -> Result<(), String> {
        self.transition(AgentStatus::Paused)
    }

    pub fn archive(&mut self) -> Result<(), String> {
        self.transition(AgentStatus::Archived)
    }

    /// Moves the agent to `next`, enforcing the lifecycle rules
    pub fn transition(&mut self, next: AgentStatus) -> Result<(), String> {
        if !self.status.can_transition_to(next) {
            return Err(format!(
                "Cannot move agent from {} to {}",
                self.status, next
            ));
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == AgentStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_agent_with_valid_fields() {
        let workspace_id = Uuid::new_v4();
        let agent = Agent::new(workspace_id, " Scout ".to_string(), "Research".to_string()).unwrap();

        assert_eq!(agent.workspace_id, workspace_id);
        assert_eq!(agent.name, "Scout");
        assert_eq!(agent.capability, "research");
        assert_eq!(agent.status, AgentStatus::Draft);
        assert!(!agent.is_active());
    }

    #[test]
    fn create_agent_with_blank_name_fails() {
        let result = Agent::new(Uuid::new_v4(), "  ".to_string(), "research".to_string());

        assert!(result.unwrap_err().contains("name cannot be empty"));
    }

    #[test]
    fn create_agent_with_blank_capability_fails() {
        let result = Agent::new(Uuid::new_v4(), "Scout".to_string(), "".to_string());

        assert!(result.is_err());
    }

    #[test]
    fn archived_agent_cannot_be_reactivated() {
        let mut agent = Agent::new(Uuid::new_v4(), "Scout".to_string(), "research".to_string()).unwrap();
        agent.activate().unwrap();
        agent.archive().unwrap();

        let result = agent.activate();
        assert!(result.unwrap_err().contains("archived"));
    }
}
