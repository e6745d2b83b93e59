// Objective-run state
//
// Tracks what the orchestrator needs between coordinator turns. It is rebuilt
// from the run's message thread when a paused run resumes, so nothing here
// has to be persisted separately.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::types::{DelegationOutcome, TurnRecord};
use crate::domain::message::{Message, MessageType};
use crate::domain::team::EscalationCondition;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunState {
    pub thread_id: Uuid,
    /// Every agent that took part, in order of first involvement
    pub agents_involved: Vec<Uuid>,
    pub turns: u32,
    /// Failed delegations since the last successful one
    pub consecutive_failures: u32,
    pub history: Vec<TurnRecord>,
    /// Indices of escalation rules that already fired
    pub fired_rules: BTreeSet<usize>,
}

impl RunState {
    pub fn new(thread_id: Uuid) -> Self {
        Self {
            thread_id,
            ..Self::default()
        }
    }

    /// Records an agent's involvement once, keeping first-seen order
    pub fn involve(&mut self, agent_id: Uuid) {
        if !self.agents_involved.contains(&agent_id) {
            self.agents_involved.push(agent_id);
        }
    }

    pub fn record_turn(&mut self, record: TurnRecord) {
        for outcome in &record.outcomes {
            self.involve(outcome.agent_id);
            if outcome.success {
                self.consecutive_failures = 0;
            } else {
                self.consecutive_failures += 1;
            }
        }
        self.turns = self.turns.max(record.turn);
        self.history.push(record);
    }

    pub fn triggered(&self, condition: EscalationCondition) -> bool {
        match condition {
            EscalationCondition::TaskFailed => self.history.last().is_some_and(TurnRecord::any_failed),
            EscalationCondition::ConsecutiveFailures { count } => self.consecutive_failures >= count,
            EscalationCondition::TurnsExceeded { turns } => self.turns >= turns,
        }
    }

    /// Rebuilds run state from the messages of a run's thread
    ///
    /// Task messages carry `{"turn": n}` in their data and result messages
    /// carry `{"turn": n, "success": bool}`; messages without them are
    /// context or status notices and only count toward involvement.
    pub fn from_thread(thread_id: Uuid, messages: &[Message]) -> Self {
        let mut state = RunState::new(thread_id);
        let mut current: Option<TurnRecord> = None;

        for message in messages {
            if let Some(agent) = message.from_agent_id {
                state.involve(agent);
            }
            let data = message.content.data.as_ref();
            let turn = data.and_then(|d| d.get("turn")).and_then(|t| t.as_u64());

            let (MessageType::Result, Some(turn), Some(agent_id)) = (message.message_type, turn, message.from_agent_id)
            else {
                continue;
            };
            let turn = turn as u32;

            if current.as_ref().is_some_and(|c| c.turn != turn) {
                if let Some(done) = current.take() {
                    state.record_turn(done);
                }
            }
            let record = current.get_or_insert_with(|| TurnRecord {
                turn,
                outcomes: Vec::new(),
            });
            record.outcomes.push(DelegationOutcome {
                agent_id,
                task: data
                    .and_then(|d| d.get("task"))
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string(),
                success: data
                    .and_then(|d| d.get("success"))
                    .and_then(|s| s.as_bool())
                    .unwrap_or(false),
                summary: message.content.body.clone(),
            });
        }

        if let Some(done) = current {
            state.record_turn(done);
        }
        state
    }
}
