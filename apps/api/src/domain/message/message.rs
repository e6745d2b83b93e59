use super::value_objects::{MessageStatus, MessageType, Priority};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where a message is addressed; exactly one of agent or team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Recipient {
    Agent(Uuid),
    Team(Uuid),
}

impl Recipient {
    /// Builds a recipient from the optional `to_agent_id` / `team_id` pair
    ///
    /// Exactly one of the two must be present.
    pub fn from_parts(to_agent_id: Option<Uuid>, team_id: Option<Uuid>) -> Result<Self, String> {
        match (to_agent_id, team_id) {
            (Some(agent), None) => Ok(Recipient::Agent(agent)),
            (None, Some(team)) => Ok(Recipient::Team(team)),
            (Some(_), Some(_)) => Err("Message must target an agent or a team, not both".to_string()),
            (None, None) => Err("Message requires to_agent_id or team_id".to_string()),
        }
    }

    pub fn agent_id(&self) -> Option<Uuid> {
        match self {
            Recipient::Agent(id) => Some(*id),
            Recipient::Team(_) => None,
        }
    }

    pub fn team_id(&self) -> Option<Uuid> {
        match self {
            Recipient::Team(id) => Some(*id),
            Recipient::Agent(_) => None,
        }
    }
}

/// Body of a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    pub subject: String,
    pub body: String,
    /// Structured payload, e.g. a task result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<Uuid>,
}

impl MessageContent {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            data: None,
            priority: Priority::default(),
            task_id: None,
            execution_id: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn for_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn for_execution(mut self, execution_id: Uuid) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.subject.trim().is_empty() && self.body.trim().is_empty() {
            return Err("Message needs a subject or a body".to_string());
        }
        Ok(())
    }
}

/// A message to be sent; the bus resolves ids, thread and status
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub from_agent_id: Option<Uuid>,
    pub recipient: Recipient,
    pub message_type: MessageType,
    pub content: MessageContent,
    pub parent_message_id: Option<Uuid>,
    pub thread_id: Option<Uuid>,
    pub initial_status: MessageStatus,
}

impl NewMessage {
    pub fn new(recipient: Recipient, message_type: MessageType, content: MessageContent) -> Self {
        Self {
            from_agent_id: None,
            recipient,
            message_type,
            content,
            parent_message_id: None,
            thread_id: None,
            initial_status: MessageStatus::Delivered,
        }
    }

    pub fn from_agent(mut self, agent_id: Uuid) -> Self {
        self.from_agent_id = Some(agent_id);
        self
    }

    pub fn in_thread(mut self, thread_id: Uuid) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn replying_to(mut self, parent_message_id: Uuid) -> Self {
        self.parent_message_id = Some(parent_message_id);
        self
    }

    /// Persist as `Pending` until the recipient picks it up
    pub fn awaiting_pickup(mut self) -> Self {
        self.initial_status = MessageStatus::Pending;
        self
    }
}

/// A persisted message
///
/// Messages are append-only. `parent_message_id` is a back-reference only;
/// thread order is reconstructed from `created_at` at query time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub from_agent_id: Option<Uuid>,
    pub recipient: Recipient,
    pub message_type: MessageType,
    pub content: MessageContent,
    pub parent_message_id: Option<Uuid>,
    pub thread_id: Uuid,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Materializes a message in `thread_id`
    pub fn create(workspace_id: Uuid, new: NewMessage, thread_id: Uuid) -> Result<Self, String> {
        new.content.validate()?;
        if new.from_agent_id.is_some() && new.from_agent_id == new.recipient.agent_id() {
            return Err("An agent cannot message itself".to_string());
        }

        Ok(Self {
            id: Uuid::new_v4(),
            workspace_id,
            from_agent_id: new.from_agent_id,
            recipient: new.recipient,
            message_type: new.message_type,
            content: new.content,
            parent_message_id: new.parent_message_id,
            thread_id,
            status: new.initial_status,
            created_at: Utc::now(),
        })
    }
}

/// Filters for listing messages; every filter is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageFilter {
    pub agent_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub thread_id: Option<Uuid>,
    pub message_type: Option<MessageType>,
    pub status: Option<MessageStatus>,
    pub execution_id: Option<Uuid>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl MessageFilter {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 500;

    pub fn limit(&self) -> u32 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> u32 {
        self.offset.unwrap_or(0)
    }

    /// `agent_id` matches either side of the conversation
    pub fn matches(&self, message: &Message) -> bool {
        if let Some(agent_id) = self.agent_id {
            if message.from_agent_id != Some(agent_id) && message.recipient.agent_id() != Some(agent_id) {
                return false;
            }
        }
        if self.team_id.is_some() && message.recipient.team_id() != self.team_id {
            return false;
        }
        if self.thread_id.is_some_and(|t| t != message.thread_id) {
            return false;
        }
        if self.message_type.is_some_and(|t| t != message.message_type) {
            return false;
        }
        if self.status.is_some_and(|s| s != message.status) {
            return false;
        }
        if self.execution_id.is_some() && message.content.execution_id != self.execution_id {
            return false;
        }
        true
    }
}
