use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::errors::{EngineError, EngineResult};
use super::events::{ActivityBroadcaster, ActivityEvent};
use super::metrics::{Counter, MetricsCollector};
use crate::domain::message::{
    Message, MessageContent, MessageFilter, MessageStatus, MessageType, NewMessage, Recipient,
};
use crate::domain::repositories::{AgentRepository, MessageRepository, TeamRepository};

/// A message fanned out to every active member of a team
#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub from_agent_id: Option<Uuid>,
    pub message_type: MessageType,
    pub content: MessageContent,
    /// Join an existing thread instead of starting a new one
    pub thread_id: Option<Uuid>,
}

/// Outcome of one broadcast recipient
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Delivery {
    pub agent_id: Uuid,
    pub message_id: Option<Uuid>,
    pub error: Option<String>,
}

impl Delivery {
    pub fn succeeded(&self) -> bool {
        self.message_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BroadcastReport {
    pub thread_id: Uuid,
    pub deliveries: Vec<Delivery>,
}

impl BroadcastReport {
    pub fn message_ids(&self) -> Vec<Uuid> {
        self.deliveries.iter().filter_map(|d| d.message_id).collect()
    }
}

/// Durable point-to-point and broadcast messaging between agents and teams
pub struct MessageBus {
    messages: Arc<dyn MessageRepository>,
    agents: Arc<dyn AgentRepository>,
    teams: Arc<dyn TeamRepository>,
    broadcaster: Arc<dyn ActivityBroadcaster>,
    metrics: Arc<dyn MetricsCollector>,
}

impl MessageBus {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        agents: Arc<dyn AgentRepository>,
        teams: Arc<dyn TeamRepository>,
        broadcaster: Arc<dyn ActivityBroadcaster>,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            messages,
            agents,
            teams,
            broadcaster,
            metrics,
        }
    }

    /// Sends one message to an agent or a team
    ///
    /// Every referenced agent, team and parent message must exist in the
    /// workspace. A reply joins its parent's thread; anything else starts a
    /// new thread unless one is given.
    #[tracing::instrument(skip(self, new), fields(message_type = ?new.message_type))]
    pub async fn send(&self, workspace_id: Uuid, new: NewMessage) -> EngineResult<Message> {
        if let Some(from) = new.from_agent_id {
            self.require_agent(workspace_id, from).await?;
        }
        match new.recipient {
            Recipient::Agent(id) => self.require_agent(workspace_id, id).await?,
            Recipient::Team(id) => {
                self.teams
                    .find_by_id(workspace_id, id)
                    .await?
                    .ok_or_else(|| EngineError::not_found("Team", id))?;
            }
        }

        let thread_id = self.resolve_thread(workspace_id, &new).await?;
        let message = Message::create(workspace_id, new, thread_id).map_err(EngineError::Validation)?;
        self.messages.insert(&message).await?;

        self.announce(&message);
        tracing::debug!(message_id = %message.id, thread_id = %thread_id, "message sent");
        Ok(message)
    }

    /// Fans a message out to every active team member except the sender
    ///
    /// All copies share one thread. Recipients are written concurrently and
    /// independently: a failed write is reported for that recipient and
    /// never undoes the others.
    #[tracing::instrument(skip(self, request))]
    pub async fn broadcast(
        &self,
        workspace_id: Uuid,
        team_id: Uuid,
        request: BroadcastRequest,
    ) -> EngineResult<BroadcastReport> {
        request.content.validate().map_err(EngineError::Validation)?;
        let team = self
            .teams
            .find_by_id(workspace_id, team_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Team", team_id))?;
        if let Some(from) = request.from_agent_id {
            self.require_agent(workspace_id, from).await?;
        }

        let member_ids: Vec<Uuid> = team.members().iter().map(|m| m.agent_id).collect();
        let recipients: Vec<Uuid> = self
            .agents
            .find_many(workspace_id, &member_ids)
            .await?
            .into_iter()
            .filter(|a| a.is_active() && Some(a.id) != request.from_agent_id)
            .map(|a| a.id)
            .collect();

        let thread_id = request.thread_id.unwrap_or_else(Uuid::new_v4);
        let writes = recipients.iter().map(|&agent_id| {
            let mut new = NewMessage::new(
                Recipient::Agent(agent_id),
                request.message_type,
                request.content.clone(),
            );
            new.from_agent_id = request.from_agent_id;
            async move {
                let message = Message::create(workspace_id, new, thread_id)?;
                self.messages
                    .insert(&message)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok::<Message, String>(message)
            }
        });
        let results = join_all(writes).await;

        let mut deliveries = Vec::with_capacity(recipients.len());
        for (agent_id, result) in recipients.into_iter().zip(results) {
            match result {
                Ok(message) => {
                    self.announce(&message);
                    deliveries.push(Delivery {
                        agent_id,
                        message_id: Some(message.id),
                        error: None,
                    });
                }
                Err(error) => {
                    self.metrics.increment(Counter::BroadcastRecipientFailed);
                    tracing::warn!(agent_id = %agent_id, error = %error, "broadcast delivery failed");
                    deliveries.push(Delivery {
                        agent_id,
                        message_id: None,
                        error: Some(error),
                    });
                }
            }
        }

        tracing::info!(
            team_id = %team_id,
            thread_id = %thread_id,
            recipients = deliveries.len(),
            "broadcast fanned out"
        );
        Ok(BroadcastReport { thread_id, deliveries })
    }

    pub async fn list(&self, workspace_id: Uuid, filter: &MessageFilter) -> EngineResult<Vec<Message>> {
        Ok(self.messages.list(workspace_id, filter).await?)
    }

    /// Messages of a thread in creation order
    pub async fn thread(&self, workspace_id: Uuid, thread_id: Uuid) -> EngineResult<Vec<Message>> {
        let messages = self.messages.find_thread(workspace_id, thread_id).await?;
        if messages.is_empty() {
            return Err(EngineError::not_found("Thread", thread_id));
        }
        Ok(messages)
    }

    pub async fn mark_read(&self, workspace_id: Uuid, message_id: Uuid) -> EngineResult<Message> {
        self.transition(workspace_id, message_id, MessageStatus::Read).await
    }

    pub async fn mark_delivered(&self, workspace_id: Uuid, message_id: Uuid) -> EngineResult<Message> {
        self.transition(workspace_id, message_id, MessageStatus::Delivered).await
    }

    pub async fn mark_failed(&self, workspace_id: Uuid, message_id: Uuid) -> EngineResult<Message> {
        self.transition(workspace_id, message_id, MessageStatus::Failed).await
    }

    async fn transition(&self, workspace_id: Uuid, message_id: Uuid, to: MessageStatus) -> EngineResult<Message> {
        let mut message = self
            .messages
            .find_by_id(workspace_id, message_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Message", message_id))?;

        if !message.status.can_transition_to(to) {
            return Err(EngineError::validation(format!(
                "Message {} cannot move from {} to {}",
                message_id, message.status, to
            )));
        }
        if !self
            .messages
            .update_status(workspace_id, message_id, message.status, to)
            .await?
        {
            return Err(EngineError::validation(format!(
                "Message {} changed status concurrently",
                message_id
            )));
        }

        message.status = to;
        Ok(message)
    }

    async fn require_agent(&self, workspace_id: Uuid, agent_id: Uuid) -> EngineResult<()> {
        self.agents
            .find_by_id(workspace_id, agent_id)
            .await?
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found("Agent", agent_id))
    }

    async fn resolve_thread(&self, workspace_id: Uuid, new: &NewMessage) -> EngineResult<Uuid> {
        let Some(parent_id) = new.parent_message_id else {
            return Ok(new.thread_id.unwrap_or_else(Uuid::new_v4));
        };

        let parent = self
            .messages
            .find_by_id(workspace_id, parent_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Message", parent_id))?;
        match new.thread_id {
            Some(thread_id) if thread_id != parent.thread_id => Err(EngineError::validation(
                "A reply must stay in its parent's thread",
            )),
            _ => Ok(parent.thread_id),
        }
    }

    fn announce(&self, message: &Message) {
        self.broadcaster.publish(ActivityEvent::MessageSent {
            workspace_id: message.workspace_id,
            message_id: message.id,
            thread_id: message.thread_id,
        });
    }
}
