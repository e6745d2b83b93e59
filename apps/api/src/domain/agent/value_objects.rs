use serde::{Deserialize, Serialize};

/// Lifecycle status of an agent
///
/// # Status Transitions
/// ```text
/// Draft -> Active <-> Paused
///   |        |          |
///   +--------+----------+---> Archived
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "agent_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Agent is being configured and cannot receive work
    Draft,
    /// Agent accepts tasks and messages
    Active,
    /// Agent is temporarily withdrawn from delegation
    Paused,
    /// Agent is retired; terminal
    Archived,
}

impl AgentStatus {
    /// Checks if a transition from current status to next status is valid
    ///
    /// # Example
    /// ```
    /// use ghostpirates_orchestrator::domain::agent::AgentStatus;
    ///
    /// assert!(AgentStatus::Draft.can_transition_to(AgentStatus::Active));
    /// assert!(!AgentStatus::Archived.can_transition_to(AgentStatus::Active));
    /// ```
    pub fn can_transition_to(&self, next: AgentStatus) -> bool {
        use AgentStatus::*;
        matches!(
            (self, next),
            (Draft, Active)
                | (Active, Paused)
                | (Paused, Active)
                | (Draft, Archived)
                | (Active, Archived)
                | (Paused, Archived)
        )
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Draft => write!(f, "draft"),
            AgentStatus::Active => write!(f, "active"),
            AgentStatus::Paused => write!(f, "paused"),
            AgentStatus::Archived => write!(f, "archived"),
        }
    }
}
