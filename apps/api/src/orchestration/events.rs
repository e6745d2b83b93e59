// Activity events
//
// State changes are announced to connected clients through an
// `ActivityBroadcaster`. Publishing never fails the operation that caused it.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::execution::ExecutionStatus;
use crate::domain::team::{EscalationAction, TeamEvent};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ActivityEvent {
    ExecutionStatusChanged {
        workspace_id: Uuid,
        execution_id: Uuid,
        status: ExecutionStatus,
    },
    StepFinished {
        workspace_id: Uuid,
        execution_id: Uuid,
        step_id: String,
        success: bool,
    },
    MessageSent {
        workspace_id: Uuid,
        message_id: Uuid,
        thread_id: Uuid,
    },
    ApprovalRequested {
        workspace_id: Uuid,
        approval_id: Uuid,
        execution_id: Uuid,
        step_id: String,
    },
    ApprovalResolved {
        workspace_id: Uuid,
        approval_id: Uuid,
        approved: bool,
    },
    TaskDelegated {
        workspace_id: Uuid,
        execution_id: Uuid,
        agent_id: Uuid,
        task_id: Uuid,
    },
    EscalationTriggered {
        workspace_id: Uuid,
        execution_id: Uuid,
        action: EscalationAction,
        reason: String,
    },
    TeamChanged {
        workspace_id: Uuid,
        change: TeamEvent,
    },
}

impl ActivityEvent {
    pub fn workspace_id(&self) -> Uuid {
        match self {
            ActivityEvent::ExecutionStatusChanged { workspace_id, .. }
            | ActivityEvent::StepFinished { workspace_id, .. }
            | ActivityEvent::MessageSent { workspace_id, .. }
            | ActivityEvent::ApprovalRequested { workspace_id, .. }
            | ActivityEvent::ApprovalResolved { workspace_id, .. }
            | ActivityEvent::TaskDelegated { workspace_id, .. }
            | ActivityEvent::EscalationTriggered { workspace_id, .. }
            | ActivityEvent::TeamChanged { workspace_id, .. } => *workspace_id,
        }
    }
}

pub trait ActivityBroadcaster: Send + Sync {
    fn publish(&self, event: ActivityEvent);
}

/// In-process fan-out over a `tokio::sync::broadcast` channel
///
/// Slow subscribers lag and lose the oldest events; publishers never wait.
pub struct ChannelBroadcaster {
    sender: broadcast::Sender<ActivityEvent>,
}

impl ChannelBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ActivityEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChannelBroadcaster {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ActivityBroadcaster for ChannelBroadcaster {
    fn publish(&self, event: ActivityEvent) {
        // Err only means nobody is listening
        if self.sender.send(event).is_err() {
            tracing::trace!("activity event dropped, no subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let broadcaster = ChannelBroadcaster::new(8);
        let mut rx = broadcaster.subscribe();
        let workspace_id = Uuid::new_v4();

        broadcaster.publish(ActivityEvent::MessageSent {
            workspace_id,
            message_id: Uuid::new_v4(),
            thread_id: Uuid::new_v4(),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.workspace_id(), workspace_id);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let broadcaster = ChannelBroadcaster::default();
        broadcaster.publish(ActivityEvent::ApprovalResolved {
            workspace_id: Uuid::new_v4(),
            approval_id: Uuid::new_v4(),
            approved: true,
        });
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = ActivityEvent::ExecutionStatusChanged {
            workspace_id: Uuid::nil(),
            execution_id: Uuid::nil(),
            status: ExecutionStatus::Paused,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "execution_status_changed");
        assert_eq!(value["status"], "paused");
    }

    #[test]
    fn team_changes_nest_the_team_event() {
        let team_id = Uuid::new_v4();
        let event = ActivityEvent::TeamChanged {
            workspace_id: Uuid::nil(),
            change: TeamEvent::AutonomyUpdated { team_id },
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["event"], "team_changed");
        assert_eq!(value["change"]["event"], "autonomy_updated");

        let back: ActivityEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }
}
