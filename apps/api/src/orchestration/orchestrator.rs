use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use uuid::Uuid;

use super::audit_ledger::AuditLedger;
use super::errors::{EngineError, EngineResult};
use super::events::{ActivityBroadcaster, ActivityEvent};
use super::executions::ExecutionTracker;
use super::message_bus::MessageBus;
use super::metrics::{Counter, MetricsCollector};
use crate::agents::{
    AgentError, AgentWorker, Assignment, Coordinator, CoordinatorDecision, DelegationOutcome, PlanningContext,
    RunState, TaskOutput, TurnRecord,
};
use crate::domain::agent::Agent;
use crate::domain::audit::AuditLogEntry;
use crate::domain::execution::{ExecutionStatus, WorkflowExecution};
use crate::domain::message::{MessageContent, MessageType, NewMessage, Priority, Recipient};
use crate::domain::repositories::{AgentRepository, TeamRepository};
use crate::domain::team::{EscalationAction, EscalationCondition, EscalationRule, MemberRole, Team};
use crate::infrastructure::Repositories;

const THREAD_KEY: &str = "thread_id";
const FIRED_RULES_KEY: &str = "fired_escalation_rules";
const SUMMARY_KEY: &str = "summary";

/// Outcome of running (or resuming) a team against an objective
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    /// Specialists that received work, in order of first delegation
    pub agents_involved: Vec<Uuid>,
    pub duration_ms: u64,
    pub turns: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A run being driven, with everything the turn loop needs
struct Run {
    team: Team,
    objective: String,
    execution: WorkflowExecution,
    state: RunState,
    started: Instant,
}

/// Turns a natural-language objective into a live run across a team
///
/// There is no step graph: each turn the coordinator decides which members
/// get which tasks. Tasks and results travel over the message bus on one
/// thread per run, which is also what a paused run is resumed from.
pub struct Orchestrator {
    teams: Arc<dyn TeamRepository>,
    agents: Arc<dyn AgentRepository>,
    tracker: Arc<ExecutionTracker>,
    bus: Arc<MessageBus>,
    coordinator: Coordinator,
    worker: AgentWorker,
    ledger: Arc<AuditLedger>,
    broadcaster: Arc<dyn ActivityBroadcaster>,
    metrics: Arc<dyn MetricsCollector>,
    max_turns: u32,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repos: &Repositories,
        tracker: Arc<ExecutionTracker>,
        bus: Arc<MessageBus>,
        coordinator: Coordinator,
        worker: AgentWorker,
        ledger: Arc<AuditLedger>,
        broadcaster: Arc<dyn ActivityBroadcaster>,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            teams: repos.teams.clone(),
            agents: repos.agents.clone(),
            tracker,
            bus,
            coordinator,
            worker,
            ledger,
            broadcaster,
            metrics,
            max_turns: 10,
        }
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = max_turns.max(1);
        self
    }

    /// Runs a team against an objective until it completes, fails or pauses
    ///
    /// A failed planning call does not surface as `Err`: it yields a failed
    /// report carrying the agents already involved.
    ///
    /// # Errors
    /// - `Validation` for an empty objective, a team without an active
    ///   coordinator, or a team without active specialists
    /// - `NotFound` if the team or its coordinator does not exist
    #[tracing::instrument(skip(self, objective))]
    pub async fn run_team(
        &self,
        workspace_id: Uuid,
        team_id: Uuid,
        objective: &str,
        priority: Priority,
    ) -> EngineResult<RunReport> {
        let started = Instant::now();
        let objective = objective.trim();
        if objective.is_empty() {
            return Err(EngineError::validation("Objective cannot be empty"));
        }

        let team = self.load_team(workspace_id, team_id).await?;
        self.require_coordinator(&team).await?;
        if self.active_specialists(&team).await?.is_empty() {
            return Err(EngineError::validation(format!(
                "Team {} has no active specialists",
                team_id
            )));
        }

        let mut execution = WorkflowExecution::for_objective(workspace_id, team_id, objective.to_string(), priority);
        self.tracker.insert(&execution).await?;
        self.tracker.transition(&mut execution, ExecutionStatus::Running).await?;

        let kickoff = self
            .bus
            .send(
                workspace_id,
                NewMessage::new(
                    Recipient::Team(team_id),
                    MessageType::Context,
                    MessageContent::new("Objective", objective)
                        .with_priority(priority)
                        .for_execution(execution.id()),
                ),
            )
            .await?;
        let expected = execution.status();
        execution.set_context_value(THREAD_KEY, json!(kickoff.thread_id));
        self.tracker.commit(&mut execution, expected).await?;

        tracing::info!(
            execution_id = %execution.id(),
            team = %team.name(),
            thread_id = %kickoff.thread_id,
            "objective run started"
        );
        self.ledger
            .record(
                AuditLogEntry::automatic(workspace_id, "objective_run_started")
                    .team(Some(team_id))
                    .execution(execution.id())
                    .context(json!({ "objective": objective, "priority": priority })),
            )
            .await;

        let run = Run {
            team,
            objective: objective.to_string(),
            state: RunState::new(kickoff.thread_id),
            execution,
            started,
        };
        self.drive(run).await
    }

    /// Continues a paused objective run from its message thread
    ///
    /// # Errors
    /// - `InvalidTransition` unless the run is paused
    /// - `Validation` for workflow executions or runs without a thread
    #[tracing::instrument(skip(self))]
    pub async fn resume_run(&self, workspace_id: Uuid, execution_id: Uuid, actor: Uuid) -> EngineResult<RunReport> {
        let started = Instant::now();
        let mut execution = self.tracker.load(workspace_id, execution_id).await?;
        let objective = execution
            .objective()
            .ok_or_else(|| EngineError::validation("Workflow executions are resumed by the workflow engine"))?
            .to_string();
        let team_id = execution
            .team_id()
            .ok_or_else(|| EngineError::validation("Objective run has no team"))?;
        if execution.status() != ExecutionStatus::Paused {
            return Err(EngineError::InvalidTransition {
                from: execution.status(),
                to: ExecutionStatus::Running,
            });
        }

        let team = self.load_team(workspace_id, team_id).await?;
        self.require_coordinator(&team).await?;

        let thread_id = execution
            .context()
            .get(THREAD_KEY)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| EngineError::validation("Objective run has no message thread"))?;
        let messages = self.bus.thread(workspace_id, thread_id).await?;
        let mut state = RunState::from_thread(thread_id, &messages);
        state.fired_rules = fired_rules(&execution);

        self.tracker.transition(&mut execution, ExecutionStatus::Running).await?;
        tracing::info!(execution_id = %execution_id, turns = state.turns, "objective run resumed");
        self.ledger
            .record(
                AuditLogEntry::human(workspace_id, "objective_run_resumed")
                    .team(Some(team_id))
                    .execution(execution_id)
                    .context(json!({ "actor": actor, "turns": state.turns })),
            )
            .await;

        let run = Run {
            team,
            objective,
            execution,
            state,
            started,
        };
        self.drive(run).await
    }

    async fn drive(&self, mut run: Run) -> EngineResult<RunReport> {
        let (workspace_id, execution_id) = (run.execution.workspace_id(), run.execution.id());

        loop {
            run.execution = self.tracker.load(workspace_id, execution_id).await?;
            if run.execution.status() != ExecutionStatus::Running {
                return Ok(self.report(&run));
            }

            let turn = run.state.turns + 1;
            if turn > self.max_turns {
                let reason = format!("Run exceeded {} coordinator turns", self.max_turns);
                return self.finish_failed(&mut run, reason).await;
            }
            let members = self.active_specialists(&run.team).await?;
            if members.is_empty() {
                return self
                    .finish_failed(&mut run, "Team has no active specialists left".to_string())
                    .await;
            }

            let ctx = PlanningContext {
                objective: &run.objective,
                team_name: run.team.name(),
                members: &members,
                history: &run.state.history,
                turn,
                max_concurrent: run.team.autonomy().max_concurrent_tasks,
            };
            let decision = match self.coordinator.plan_turn(&ctx).await {
                Ok(decision) => decision,
                Err(e) => {
                    self.metrics.increment(Counter::PlanningFailure);
                    tracing::error!(execution_id = %execution_id, turn, error = %e, "coordinator planning failed");
                    return self.finish_failed(&mut run, format!("Planning failed: {}", e)).await;
                }
            };

            match decision {
                CoordinatorDecision::Complete { summary } => return self.finish_completed(&mut run, summary).await,
                CoordinatorDecision::Delegate { assignments, rationale } => {
                    tracing::info!(
                        execution_id = %execution_id,
                        turn,
                        assignments = assignments.len(),
                        rationale = %rationale,
                        "coordinator delegated"
                    );
                    let outcomes = self.delegate(&run, turn, assignments).await;
                    run.state.record_turn(TurnRecord { turn, outcomes });

                    if self.apply_escalations(&mut run).await? {
                        return Ok(self.report(&run));
                    }
                }
            }
        }
    }

    /// Runs one turn's assignments, at most `max_concurrent_tasks` at a time
    async fn delegate(&self, run: &Run, turn: u32, assignments: Vec<Assignment>) -> Vec<DelegationOutcome> {
        let permits = run.team.autonomy().max_concurrent_tasks.max(1) as usize;
        let semaphore = Semaphore::new(permits);
        let semaphore = &semaphore;

        let tasks = assignments.into_iter().map(|assignment| async move {
            let _permit = semaphore.acquire().await.ok();
            self.run_assignment(run, turn, assignment).await
        });
        join_all(tasks).await
    }

    async fn run_assignment(&self, run: &Run, turn: u32, assignment: Assignment) -> DelegationOutcome {
        let workspace_id = run.execution.workspace_id();
        let execution_id = run.execution.id();
        let thread_id = run.state.thread_id;
        let task_id = Uuid::new_v4();

        let task_message = self
            .bus
            .send(
                workspace_id,
                NewMessage::new(
                    Recipient::Agent(assignment.agent_id),
                    MessageType::Task,
                    MessageContent::new(format!("Task for turn {}", turn), assignment.task.clone())
                        .with_data(json!({ "turn": turn, "task": assignment.task }))
                        .for_task(task_id)
                        .for_execution(execution_id),
                )
                .in_thread(thread_id)
                .awaiting_pickup(),
            )
            .await;
        let task_message = match task_message {
            Ok(message) => message,
            Err(e) => return self.outcome(run, turn, &assignment, task_id, Err(e.to_string())).await,
        };

        let agent = match self.agents.find_by_id(workspace_id, assignment.agent_id).await {
            Ok(Some(agent)) if agent.is_active() => Ok(agent),
            Ok(Some(_)) => Err(AgentError::AgentInactive(assignment.agent_id).to_string()),
            Ok(None) => Err(AgentError::AgentNotFound(assignment.agent_id).to_string()),
            Err(e) => Err(e.to_string()),
        };
        let agent = match agent {
            Ok(agent) => agent,
            Err(error) => {
                if let Err(e) = self.bus.mark_failed(workspace_id, task_message.id).await {
                    tracing::warn!(message_id = %task_message.id, error = %e, "could not mark task message failed");
                }
                return self.outcome(run, turn, &assignment, task_id, Err(error)).await;
            }
        };

        if let Err(e) = self.bus.mark_delivered(workspace_id, task_message.id).await {
            tracing::warn!(message_id = %task_message.id, error = %e, "could not mark task message delivered");
        }
        let result = self
            .worker
            .execute_task(&agent, task_id, &assignment.task, &run.objective)
            .await
            .map_err(|e| e.to_string());

        let reply = self.report_result(run, turn, &assignment, task_id, task_message.id, &result).await;
        if let Err(e) = reply {
            tracing::warn!(task_id = %task_id, error = %e, "could not post task result");
        }
        self.outcome(run, turn, &assignment, task_id, result.map(|output| output.summary))
            .await
    }

    async fn report_result(
        &self,
        run: &Run,
        turn: u32,
        assignment: &Assignment,
        task_id: Uuid,
        task_message_id: Uuid,
        result: &Result<TaskOutput, String>,
    ) -> EngineResult<()> {
        let (body, success, output) = match result {
            Ok(output) => (output.summary.clone(), true, output.result.clone()),
            Err(error) => (error.clone(), false, Value::Null),
        };
        self.bus
            .send(
                run.execution.workspace_id(),
                NewMessage::new(
                    Recipient::Team(run.team.id()),
                    MessageType::Result,
                    MessageContent::new(format!("Result for turn {}", turn), body)
                        .with_data(json!({
                            "turn": turn,
                            "task": assignment.task,
                            "success": success,
                            "result": output,
                        }))
                        .for_task(task_id)
                        .for_execution(run.execution.id()),
                )
                .from_agent(assignment.agent_id)
                .in_thread(run.state.thread_id)
                .replying_to(task_message_id),
            )
            .await?;
        Ok(())
    }

    async fn outcome(
        &self,
        run: &Run,
        turn: u32,
        assignment: &Assignment,
        task_id: Uuid,
        result: Result<String, String>,
    ) -> DelegationOutcome {
        let workspace_id = run.execution.workspace_id();
        let success = result.is_ok();
        let summary = match result {
            Ok(summary) | Err(summary) => summary,
        };

        self.metrics.increment(Counter::Delegation);
        self.broadcaster.publish(ActivityEvent::TaskDelegated {
            workspace_id,
            execution_id: run.execution.id(),
            agent_id: assignment.agent_id,
            task_id,
        });
        if !success {
            tracing::warn!(agent_id = %assignment.agent_id, task_id = %task_id, error = %summary, "delegated task failed");
        }
        self.ledger
            .record(
                AuditLogEntry::automatic(workspace_id, "task_delegated")
                    .team(Some(run.team.id()))
                    .agent(Some(assignment.agent_id))
                    .execution(run.execution.id())
                    .success(success)
                    .context(json!({
                        "turn": turn,
                        "task_id": task_id,
                        "task": assignment.task,
                        "error": (!success).then(|| summary.clone()),
                    })),
            )
            .await;

        DelegationOutcome {
            agent_id: assignment.agent_id,
            task: assignment.task.clone(),
            success,
            summary,
        }
    }

    /// Fires every escalation rule whose condition newly holds
    ///
    /// Returns true when a rule paused the run.
    async fn apply_escalations(&self, run: &mut Run) -> EngineResult<bool> {
        let rules: Vec<(usize, EscalationRule)> = run
            .team
            .autonomy()
            .escalation_rules
            .iter()
            .copied()
            .enumerate()
            .filter(|(index, rule)| !run.state.fired_rules.contains(index) && run.state.triggered(rule.condition))
            .collect();
        if rules.is_empty() {
            return Ok(false);
        }

        let workspace_id = run.execution.workspace_id();
        let mut paused = false;
        for (index, rule) in rules {
            run.state.fired_rules.insert(index);
            let reason = describe(rule.condition);
            tracing::warn!(
                execution_id = %run.execution.id(),
                action = ?rule.action,
                reason = %reason,
                "escalation rule fired"
            );
            self.broadcaster.publish(ActivityEvent::EscalationTriggered {
                workspace_id,
                execution_id: run.execution.id(),
                action: rule.action,
                reason: reason.clone(),
            });

            match rule.action {
                EscalationAction::Notify => {}
                EscalationAction::Escalate => {
                    let notice = NewMessage::new(
                        Recipient::Team(run.team.id()),
                        MessageType::Status,
                        MessageContent::new("Escalation", reason.clone())
                            .with_priority(Priority::Urgent)
                            .for_execution(run.execution.id()),
                    )
                    .in_thread(run.state.thread_id);
                    if let Err(e) = self.bus.send(workspace_id, notice).await {
                        tracing::warn!(error = %e, "could not post escalation notice");
                    }
                }
                EscalationAction::Pause => paused = true,
            }
            self.ledger
                .record(
                    AuditLogEntry::automatic(workspace_id, "escalation_triggered")
                        .team(Some(run.team.id()))
                        .execution(run.execution.id())
                        .context(json!({ "action": rule.action, "reason": reason, "turn": run.state.turns })),
                )
                .await;
        }

        let expected = run.execution.status();
        run.execution.set_context_value(FIRED_RULES_KEY, json!(run.state.fired_rules));
        if paused {
            run.execution.transition_to(ExecutionStatus::Paused)?;
        }
        self.commit_or_reload(&mut run.execution, expected).await?;
        Ok(paused && run.execution.status() == ExecutionStatus::Paused)
    }

    async fn finish_completed(&self, run: &mut Run, summary: String) -> EngineResult<RunReport> {
        let expected = run.execution.status();
        run.execution.set_context_value(SUMMARY_KEY, json!(summary));
        run.execution.transition_to(ExecutionStatus::Completed)?;
        self.commit_or_reload(&mut run.execution, expected).await?;

        if run.execution.status() == ExecutionStatus::Completed {
            let notice = NewMessage::new(
                Recipient::Team(run.team.id()),
                MessageType::Status,
                MessageContent::new("Objective complete", summary.clone()).for_execution(run.execution.id()),
            )
            .in_thread(run.state.thread_id);
            if let Err(e) = self.bus.send(run.execution.workspace_id(), notice).await {
                tracing::warn!(error = %e, "could not post completion notice");
            }
            tracing::info!(execution_id = %run.execution.id(), turns = run.state.turns, "objective run completed");
        }
        self.audit_finish(run, "objective_run_completed", true).await;
        Ok(self.report(run))
    }

    async fn finish_failed(&self, run: &mut Run, reason: String) -> EngineResult<RunReport> {
        let expected = run.execution.status();
        run.execution.fail(reason)?;
        self.commit_or_reload(&mut run.execution, expected).await?;
        self.audit_finish(run, "objective_run_failed", false).await;
        Ok(self.report(run))
    }

    async fn audit_finish(&self, run: &Run, action_type: &str, success: bool) {
        self.ledger
            .record(
                AuditLogEntry::automatic(run.execution.workspace_id(), action_type)
                    .team(Some(run.team.id()))
                    .execution(run.execution.id())
                    .success(success)
                    .context(json!({
                        "status": run.execution.status(),
                        "turns": run.state.turns,
                        "agents_involved": run.state.agents_involved,
                        "error": run.execution.error(),
                    })),
            )
            .await;
    }

    fn report(&self, run: &Run) -> RunReport {
        RunReport {
            execution_id: run.execution.id(),
            status: run.execution.status(),
            agents_involved: run.state.agents_involved.clone(),
            duration_ms: run.started.elapsed().as_millis() as u64,
            turns: run.state.turns,
            summary: run
                .execution
                .context()
                .get(SUMMARY_KEY)
                .and_then(Value::as_str)
                .map(str::to_string),
            error: run.execution.error().map(str::to_string),
        }
    }

    /// A paused or cancelled run keeps the status someone else gave it
    async fn commit_or_reload(&self, execution: &mut WorkflowExecution, expected: ExecutionStatus) -> EngineResult<()> {
        match self.tracker.commit(execution, expected).await {
            Err(EngineError::Conflict(_)) => {
                *execution = self.tracker.load(execution.workspace_id(), execution.id()).await?;
                tracing::info!(execution_id = %execution.id(), status = %execution.status(), "run changed concurrently");
                Ok(())
            }
            other => other,
        }
    }

    async fn load_team(&self, workspace_id: Uuid, team_id: Uuid) -> EngineResult<Team> {
        self.teams
            .find_by_id(workspace_id, team_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Team", team_id))
    }

    async fn require_coordinator(&self, team: &Team) -> EngineResult<Agent> {
        let coordinator_id = team
            .coordinator_id()
            .ok_or_else(|| EngineError::validation(format!("Team {} has no coordinator", team.id())))?;
        let coordinator = self
            .agents
            .find_by_id(team.workspace_id(), coordinator_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Agent", coordinator_id))?;
        if !coordinator.is_active() {
            return Err(EngineError::validation(format!(
                "Coordinator {} is not active",
                coordinator_id
            )));
        }
        Ok(coordinator)
    }

    /// Active specialists, highest priority first
    async fn active_specialists(&self, team: &Team) -> EngineResult<Vec<Agent>> {
        let ids: Vec<Uuid> = team
            .members()
            .iter()
            .filter(|m| m.role == MemberRole::Specialist)
            .map(|m| m.agent_id)
            .collect();
        let mut agents: Vec<Agent> = self
            .agents
            .find_many(team.workspace_id(), &ids)
            .await?
            .into_iter()
            .filter(Agent::is_active)
            .collect();
        let ranked: Vec<Uuid> = team.specialists().iter().map(|m| m.agent_id).collect();
        agents.sort_by_key(|a| ranked.iter().position(|id| *id == a.id));
        Ok(agents)
    }
}

fn fired_rules(execution: &WorkflowExecution) -> BTreeSet<usize> {
    execution
        .context()
        .get(FIRED_RULES_KEY)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

fn describe(condition: EscalationCondition) -> String {
    match condition {
        EscalationCondition::TaskFailed => "A delegated task failed".to_string(),
        EscalationCondition::ConsecutiveFailures { count } => {
            format!("{} delegated tasks failed in a row", count)
        }
        EscalationCondition::TurnsExceeded { turns } => format!("The run used {} coordinator turns", turns),
    }
}
