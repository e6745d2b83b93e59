use std::collections::HashMap;
use std::sync::Arc;

use super::completion::{CompletionClient, CompletionRequest};
use super::errors::{AgentError, AgentResult};
use super::prompts::library;
use super::types::{extract_json, CoordinatorDecision, TurnRecord};
use crate::domain::agent::Agent;

/// Everything the coordinator sees when planning a turn
pub struct PlanningContext<'a> {
    pub objective: &'a str,
    pub team_name: &'a str,
    /// Active specialists the coordinator may delegate to
    pub members: &'a [Agent],
    pub history: &'a [TurnRecord],
    pub turn: u32,
    pub max_concurrent: u32,
}

/// Coordinator agent: plans an objective run turn by turn
///
/// It never executes work itself. Each turn it either delegates tasks to
/// team members or declares the objective complete.
#[derive(Clone)]
pub struct Coordinator {
    client: Arc<dyn CompletionClient>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Coordinator {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            max_tokens: 4096,
            temperature: 0.7,
        }
    }

    /// Asks the model for the next decision and checks it against the team
    ///
    /// # Errors
    /// - `Completion` when the model call fails
    /// - `InvalidPlan` when the answer is not a decision, delegates to no
    ///   one, or names an agent outside `ctx.members`
    pub async fn plan_turn(&self, ctx: &PlanningContext<'_>) -> AgentResult<CoordinatorDecision> {
        let template = library::coordinator_turn();
        let mut vars = HashMap::new();
        vars.insert("objective".to_string(), ctx.objective.to_string());
        vars.insert("team".to_string(), ctx.team_name.to_string());
        vars.insert("turn".to_string(), ctx.turn.to_string());
        vars.insert("max_concurrent".to_string(), ctx.max_concurrent.to_string());
        vars.insert("members".to_string(), describe_members(ctx.members));
        vars.insert("history".to_string(), describe_history(ctx.history));

        let request = CompletionRequest {
            template: template.name.clone(),
            system: template.render_system(&vars),
            prompt: template.render(&vars),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let response = self.client.complete(request).await?;

        let value = extract_json(&response.text)
            .ok_or_else(|| AgentError::InvalidPlan("coordinator did not answer with JSON".to_string()))?;
        let decision: CoordinatorDecision = serde_json::from_value(value)?;
        validate(&decision, ctx.members)?;

        Ok(decision)
    }
}

fn validate(decision: &CoordinatorDecision, members: &[Agent]) -> AgentResult<()> {
    match decision {
        CoordinatorDecision::Delegate { assignments, .. } => {
            if assignments.is_empty() {
                return Err(AgentError::InvalidPlan("delegation names no assignments".to_string()));
            }
            for assignment in assignments {
                if !members.iter().any(|m| m.id == assignment.agent_id) {
                    return Err(AgentError::InvalidPlan(format!(
                        "agent {} is not an active member of the team",
                        assignment.agent_id
                    )));
                }
                if assignment.task.trim().is_empty() {
                    return Err(AgentError::InvalidPlan(format!(
                        "empty task for agent {}",
                        assignment.agent_id
                    )));
                }
            }
            Ok(())
        }
        CoordinatorDecision::Complete { .. } => Ok(()),
    }
}

fn describe_members(members: &[Agent]) -> String {
    members
        .iter()
        .map(|m| format!("- {} ({}): {}", m.id, m.capability, m.name))
        .collect::<Vec<_>>()
        .join("\n")
}

fn describe_history(history: &[TurnRecord]) -> String {
    if history.is_empty() {
        return "(nothing yet)".to_string();
    }
    history
        .iter()
        .flat_map(|turn| {
            turn.outcomes.iter().map(move |o| {
                format!(
                    "Turn {} - {} [{}] {}: {}",
                    turn.turn,
                    o.agent_id,
                    if o.success { "done" } else { "failed" },
                    o.task,
                    o.summary
                )
            })
        })
        .collect::<Vec<_>>()
        .join("\n")
}
