use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One immutable record of an automatic or human-gated decision
///
/// The audit log is the source of truth for "what happened", independent of
/// later mutations to executions or messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub team_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub execution_id: Option<Uuid>,
    pub action_type: String,
    /// False when a human made or gated the decision
    pub was_automatic: bool,
    pub success: bool,
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// An entry for something the engine did on its own
    pub fn automatic(workspace_id: Uuid, action_type: impl Into<String>) -> Self {
        Self::build(workspace_id, action_type.into(), true)
    }

    /// An entry for a decision a person made
    pub fn human(workspace_id: Uuid, action_type: impl Into<String>) -> Self {
        Self::build(workspace_id, action_type.into(), false)
    }

    fn build(workspace_id: Uuid, action_type: String, was_automatic: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            team_id: None,
            agent_id: None,
            execution_id: None,
            action_type,
            was_automatic,
            success: true,
            context: serde_json::Value::Object(Default::default()),
            created_at: Utc::now(),
        }
    }

    pub fn team(mut self, team_id: Option<Uuid>) -> Self {
        self.team_id = team_id;
        self
    }

    pub fn agent(mut self, agent_id: Option<Uuid>) -> Self {
        self.agent_id = agent_id;
        self
    }

    pub fn execution(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    pub fn context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// Read-only filters over the audit log
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub team_id: Option<Uuid>,
    pub agent_id: Option<Uuid>,
    pub execution_id: Option<Uuid>,
    pub action_type: Option<String>,
    pub was_automatic: Option<bool>,
    pub success: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl AuditQuery {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), String> {
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err("Audit date range start must not be after its end".to_string());
            }
        }
        Ok(())
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        if self.team_id.is_some() && entry.team_id != self.team_id {
            return false;
        }
        if self.agent_id.is_some() && entry.agent_id != self.agent_id {
            return false;
        }
        if self.execution_id.is_some() && entry.execution_id != self.execution_id {
            return false;
        }
        if let Some(action_type) = &self.action_type {
            if &entry.action_type != action_type {
                return false;
            }
        }
        if self.was_automatic.is_some_and(|v| v != entry.was_automatic) {
            return false;
        }
        if self.success.is_some_and(|v| v != entry.success) {
            return false;
        }
        if self.from.is_some_and(|from| entry.created_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| entry.created_at > to) {
            return false;
        }
        true
    }
}
