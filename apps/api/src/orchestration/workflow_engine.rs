use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::approval_gate::ApprovalGate;
use super::audit_ledger::AuditLedger;
use super::errors::{EngineError, EngineResult};
use super::events::{ActivityBroadcaster, ActivityEvent};
use super::executions::ExecutionTracker;
use super::metrics::{Counter, MetricsCollector};
use super::retry::BackoffPolicy;
use crate::agents::{AgentError, AgentWorker};
use crate::domain::approval::{ApprovalRequest, ApprovalStatus};
use crate::domain::audit::AuditLogEntry;
use crate::domain::execution::{ExecutionStatus, StepResult, StepStatus, WorkflowExecution};
use crate::domain::repositories::{AgentRepository, RepositoryError, TeamRepository, WorkflowRepository};
use crate::domain::team::Team;
use crate::domain::workflow::conditions::all_hold;
use crate::domain::workflow::{Step, Workflow};
use crate::infrastructure::Repositories;

/// Human-initiated updates retry this often when they race the step loop
const CONFLICT_RETRIES: usize = 3;

/// Step runs an execution may record before it is failed
pub const DEFAULT_MAX_STEP_RUNS: u32 = 100;

/// Executes pre-authored workflow graphs
///
/// Steps run one at a time on the caller's task. Between steps the engine
/// re-reads the execution, so a pause or cancel issued by someone else takes
/// effect at the next step boundary. Every write is a conditional update.
pub struct WorkflowEngine {
    workflows: Arc<dyn WorkflowRepository>,
    agents: Arc<dyn AgentRepository>,
    teams: Arc<dyn TeamRepository>,
    tracker: Arc<ExecutionTracker>,
    worker: AgentWorker,
    approvals: Arc<ApprovalGate>,
    ledger: Arc<AuditLedger>,
    broadcaster: Arc<dyn ActivityBroadcaster>,
    metrics: Arc<dyn MetricsCollector>,
    backoff: BackoffPolicy,
    max_step_runs: u32,
}

/// What a step left the execution waiting on
enum StepOutcome {
    Continue,
    Parked,
}

/// Why one attempt at a step failed
#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error(transparent)]
    Store(#[from] RepositoryError),
}

impl AttemptError {
    fn is_retryable(&self) -> bool {
        match self {
            AttemptError::Agent(e) => e.is_retryable(),
            AttemptError::Store(e) => e.is_transient(),
        }
    }
}

impl WorkflowEngine {
    pub fn new(
        repos: &Repositories,
        tracker: Arc<ExecutionTracker>,
        worker: AgentWorker,
        approvals: Arc<ApprovalGate>,
        ledger: Arc<AuditLedger>,
        broadcaster: Arc<dyn ActivityBroadcaster>,
        metrics: Arc<dyn MetricsCollector>,
    ) -> Self {
        Self {
            workflows: repos.workflows.clone(),
            agents: repos.agents.clone(),
            teams: repos.teams.clone(),
            tracker,
            worker,
            approvals,
            ledger,
            broadcaster,
            metrics,
            backoff: BackoffPolicy::default(),
            max_step_runs: DEFAULT_MAX_STEP_RUNS,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Caps how many step runs one execution may record, so graphs that
    /// loop through `on_success` / `on_failure` pointers terminate
    pub fn with_max_step_runs(mut self, max_step_runs: u32) -> Self {
        self.max_step_runs = max_step_runs.max(1);
        self
    }

    pub async fn get(&self, workspace_id: Uuid, execution_id: Uuid) -> EngineResult<WorkflowExecution> {
        self.tracker.load(workspace_id, execution_id).await
    }

    /// Creates an execution of a workflow and drives it until it finishes
    /// or parks
    #[tracing::instrument(skip(self))]
    pub async fn start(&self, workspace_id: Uuid, workflow_id: Uuid) -> EngineResult<WorkflowExecution> {
        let workflow = self
            .workflows
            .find_by_id(workspace_id, workflow_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Workflow", workflow_id))?;
        let team = self.load_team(&workflow).await?;

        let mut execution = WorkflowExecution::for_workflow(&workflow);
        self.tracker.insert(&execution).await?;
        self.tracker.transition(&mut execution, ExecutionStatus::Running).await?;

        tracing::info!(
            execution_id = %execution.id(),
            workflow = %workflow.name,
            version = workflow.version,
            "workflow execution started"
        );
        self.ledger
            .record(
                AuditLogEntry::automatic(workspace_id, "workflow_started")
                    .team(workflow.team_id)
                    .execution(execution.id())
                    .context(json!({ "workflow_id": workflow.id, "version": workflow.version })),
            )
            .await;

        self.drive(&workflow, team.as_ref(), execution).await
    }

    /// Parks a running execution
    ///
    /// # Errors
    /// - `InvalidTransition` unless the execution is running, including when
    ///   it is already paused
    #[tracing::instrument(skip(self))]
    pub async fn pause(&self, workspace_id: Uuid, execution_id: Uuid, actor: Uuid) -> EngineResult<WorkflowExecution> {
        let execution = self
            .update(workspace_id, execution_id, |execution| {
                execution.transition_to(ExecutionStatus::Paused)?;
                Ok(())
            })
            .await?;

        self.audit_human(&execution, "execution_paused", actor, json!({ "step_id": execution.current_step_id() }))
            .await;
        Ok(execution)
    }

    /// Re-enters the step loop of a paused workflow execution at its stored
    /// pointer
    ///
    /// Conditions of the current step are evaluated again against the
    /// context as it is now.
    ///
    /// # Errors
    /// - `InvalidTransition` unless the execution is paused
    /// - `Validation` while the current step still waits for approval, or
    ///   for objective runs
    #[tracing::instrument(skip(self))]
    pub async fn resume(&self, workspace_id: Uuid, execution_id: Uuid, actor: Uuid) -> EngineResult<WorkflowExecution> {
        let current = self.tracker.load(workspace_id, execution_id).await?;
        let workflow = self.workflow_of(&current).await?;
        let team = self.load_team(&workflow).await?;

        if current.status() != ExecutionStatus::Paused {
            return Err(EngineError::InvalidTransition {
                from: current.status(),
                to: ExecutionStatus::Running,
            });
        }
        if let Some(step_id) = current.current_step_id() {
            if let Some(request) = self
                .approvals
                .latest_for_step(workspace_id, execution_id, step_id)
                .await?
                .filter(ApprovalRequest::is_pending)
            {
                return Err(EngineError::validation(format!(
                    "Step {} is waiting for approval {}",
                    step_id, request.id
                )));
            }
        }

        let execution = self
            .update(workspace_id, execution_id, |execution| {
                execution.transition_to(ExecutionStatus::Running)?;
                Ok(())
            })
            .await?;
        self.audit_human(&execution, "execution_resumed", actor, json!({ "step_id": execution.current_step_id() }))
            .await;

        self.drive(&workflow, team.as_ref(), execution).await
    }

    /// Cancels any non-terminal execution, workflow or objective run
    ///
    /// A step that is already running finishes, but the loop does not move
    /// past it.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, workspace_id: Uuid, execution_id: Uuid, actor: Uuid) -> EngineResult<WorkflowExecution> {
        let execution = self
            .update(workspace_id, execution_id, |execution| {
                execution.transition_to(ExecutionStatus::Cancelled)?;
                Ok(())
            })
            .await?;

        self.approvals.waitpoints().release(execution_id);
        self.audit_human(&execution, "execution_cancelled", actor, json!({ "step_id": execution.current_step_id() }))
            .await;
        Ok(execution)
    }

    /// Runs a failed step again with a fresh attempt counter
    ///
    /// Only that step's result is replaced and the execution keeps its
    /// status. Not allowed while the step loop owns the execution (pending
    /// or running) or after it was cancelled.
    ///
    /// # Errors
    /// - `Validation` if the step is unknown or its last result is not
    ///   `failed`, or the execution is in a status that forbids retrying
    #[tracing::instrument(skip(self))]
    pub async fn retry_step(
        &self,
        workspace_id: Uuid,
        execution_id: Uuid,
        step_id: &str,
        actor: Uuid,
    ) -> EngineResult<WorkflowExecution> {
        let execution = self.tracker.load(workspace_id, execution_id).await?;
        let workflow = self.workflow_of(&execution).await?;
        let step = workflow
            .step(step_id)
            .ok_or_else(|| EngineError::validation(format!("Workflow has no step {}", step_id)))?;

        if matches!(
            execution.status(),
            ExecutionStatus::Pending | ExecutionStatus::Running | ExecutionStatus::Cancelled
        ) {
            return Err(EngineError::validation(format!(
                "Cannot retry a step while the execution is {}",
                execution.status()
            )));
        }
        match execution.last_result(step_id).map(|r| r.status) {
            Some(StepStatus::Failed) => {}
            Some(status) => {
                return Err(EngineError::validation(format!(
                    "Step {} was {}; only failed steps can be retried",
                    step_id, status
                )))
            }
            None => return Err(EngineError::validation(format!("Step {} has not run", step_id))),
        }

        tracing::info!(execution_id = %execution_id, step_id, "retrying failed step");
        let result = self.invoke(step, &execution).await;
        let succeeded = result.succeeded();

        let mut stored = execution;
        let expected = stored.status();
        stored.record_step(result.clone());
        if succeeded && stored.current_step_id() == Some(step_id) {
            stored.advance_to(step.on_success.clone());
        }
        self.tracker.commit(&mut stored, expected).await?;

        self.announce_step(&stored, step, &result).await;
        self.audit_human(&stored, "step_retried", actor, json!({ "step_id": step_id, "success": succeeded }))
            .await;
        Ok(stored)
    }

    /// Applies a resolved approval to the execution parked on it
    ///
    /// An approval resumes the execution at the gated step. A rejection
    /// records the step as rejected and cancels the execution. Executions
    /// that are no longer parked on the request are returned unchanged.
    #[tracing::instrument(skip(self, request), fields(approval_id = %request.id))]
    pub async fn apply_decision(&self, request: &ApprovalRequest, actor: Uuid) -> EngineResult<WorkflowExecution> {
        let (workspace_id, execution_id) = (request.workspace_id, request.execution_id);
        let execution = self.tracker.load(workspace_id, execution_id).await?;

        let parked_here = execution.status() == ExecutionStatus::Paused
            && execution.current_step_id() == Some(request.step_id.as_str());
        if !parked_here {
            tracing::debug!(status = %execution.status(), "execution is not parked on this approval");
            return Ok(execution);
        }

        match request.status {
            ApprovalStatus::Approved => self.resume(workspace_id, execution_id, actor).await,
            ApprovalStatus::Rejected => {
                let reason = request.decision.as_ref().and_then(|d| d.reason.clone());
                let step_id = request.step_id.clone();
                let execution = self
                    .update(workspace_id, execution_id, |execution| {
                        execution.record_step(StepResult::rejected(&step_id, reason.clone()));
                        execution.transition_to(ExecutionStatus::Cancelled)?;
                        execution.set_error(format!("Step {} was rejected by a reviewer", step_id));
                        Ok(())
                    })
                    .await?;
                self.approvals.waitpoints().release(execution_id);
                tracing::info!(execution_id = %execution_id, step_id = %request.step_id, "step rejected, execution cancelled");
                Ok(execution)
            }
            ApprovalStatus::Pending => Err(EngineError::validation(format!(
                "Approval request {} is still pending",
                request.id
            ))),
        }
    }

    /// Waits for the approval the execution is parked on, then applies it
    pub async fn await_decision(&self, workspace_id: Uuid, execution_id: Uuid) -> EngineResult<WorkflowExecution> {
        let execution = self.tracker.load(workspace_id, execution_id).await?;
        let step_id = execution
            .current_step_id()
            .ok_or_else(|| EngineError::validation("Execution has no current step"))?
            .to_string();
        let token = self
            .approvals
            .waitpoints()
            .token_for(execution_id, &step_id)
            .ok_or_else(|| EngineError::validation(format!("Step {} is not waiting for approval", step_id)))?;

        if self.approvals.waitpoints().wait(token).await.is_none() {
            return self.tracker.load(workspace_id, execution_id).await;
        }
        let request = self
            .approvals
            .latest_for_step(workspace_id, execution_id, &step_id)
            .await?
            .ok_or_else(|| EngineError::validation(format!("Step {} has no approval request", step_id)))?;
        let actor = request.decision.as_ref().map(|d| d.decided_by).unwrap_or_default();
        self.apply_decision(&request, actor).await
    }

    async fn drive(
        &self,
        workflow: &Workflow,
        team: Option<&Team>,
        mut execution: WorkflowExecution,
    ) -> EngineResult<WorkflowExecution> {
        let (workspace_id, execution_id) = (execution.workspace_id(), execution.id());

        loop {
            if execution.status() != ExecutionStatus::Running {
                tracing::info!(execution_id = %execution_id, status = %execution.status(), "step loop stopped");
                if execution.status().is_terminal() {
                    self.approvals.waitpoints().release(execution_id);
                }
                return Ok(execution);
            }

            let Some(step_id) = execution.current_step_id().map(str::to_string) else {
                let expected = execution.status();
                execution.transition_to(ExecutionStatus::Completed)?;
                self.commit_or_reload(&mut execution, expected).await?;
                continue;
            };
            let Some(step) = workflow.step(&step_id) else {
                let expected = execution.status();
                execution.fail(format!("Workflow has no step {}", step_id))?;
                self.commit_or_reload(&mut execution, expected).await?;
                continue;
            };
            if execution.step_log().len() >= self.max_step_runs as usize {
                tracing::error!(
                    execution_id = %execution_id,
                    step_id = %step_id,
                    max_step_runs = self.max_step_runs,
                    "step budget exhausted"
                );
                let expected = execution.status();
                execution.fail(format!(
                    "Execution exceeded its budget of {} step runs at step {}",
                    self.max_step_runs, step_id
                ))?;
                self.commit_or_reload(&mut execution, expected).await?;
                continue;
            }

            match self.run_step(step, team, &mut execution).await? {
                StepOutcome::Parked => return Ok(execution),
                StepOutcome::Continue => {
                    execution = self.tracker.load(workspace_id, execution_id).await?;
                }
            }
        }
    }

    async fn run_step(
        &self,
        step: &Step,
        team: Option<&Team>,
        execution: &mut WorkflowExecution,
    ) -> EngineResult<StepOutcome> {
        if !all_hold(&step.conditions, execution.context()) {
            tracing::debug!(step_id = %step.id, "conditions not met, step skipped");
            let result = StepResult::skipped(&step.id);
            self.finish_step(execution, step, result, step.on_failure.clone(), None).await?;
            return Ok(StepOutcome::Continue);
        }

        if team.is_some_and(|t| t.requires_approval(step.action)) && !self.is_approved(execution, step).await? {
            self.park_for_approval(execution, step).await?;
            return Ok(StepOutcome::Parked);
        }

        let result = self.invoke(step, execution).await;
        let (next, failure) = if result.succeeded() {
            (step.on_success.clone(), None)
        } else {
            let error = result.error.clone().unwrap_or_default();
            let failure = step
                .on_failure
                .is_none()
                .then(|| format!("Step {} failed: {}", step.id, error));
            (step.on_failure.clone(), failure)
        };
        self.finish_step(execution, step, result, next, failure).await?;
        Ok(StepOutcome::Continue)
    }

    /// The step may run if its last result waits on an approval that has
    /// since been granted
    async fn is_approved(&self, execution: &WorkflowExecution, step: &Step) -> EngineResult<bool> {
        let awaiting = execution
            .last_result(&step.id)
            .is_some_and(|r| r.status == StepStatus::AwaitingApproval);
        if !awaiting {
            return Ok(false);
        }
        let latest = self
            .approvals
            .latest_for_step(execution.workspace_id(), execution.id(), &step.id)
            .await?;
        Ok(latest.is_some_and(|r| r.status == ApprovalStatus::Approved))
    }

    async fn park_for_approval(&self, execution: &mut WorkflowExecution, step: &Step) -> EngineResult<()> {
        let token = self.approvals.open_waitpoint(execution.id(), &step.id);
        let request = self
            .approvals
            .request_approval(execution.workspace_id(), execution.id(), &step.id, step.action, token)
            .await?;

        let expected = execution.status();
        let mut parked = execution.clone();
        parked.record_step(StepResult::awaiting_approval(&step.id, request.id));
        parked.transition_to(ExecutionStatus::Paused)?;
        match self.tracker.commit(&mut parked, expected).await {
            Ok(()) => *execution = parked,
            Err(EngineError::Conflict(_)) => {
                *execution = self.tracker.load(execution.workspace_id(), execution.id()).await?;
                tracing::warn!(
                    execution_id = %execution.id(),
                    status = %execution.status(),
                    "execution changed before it could park for approval"
                );
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        tracing::info!(execution_id = %execution.id(), step_id = %step.id, approval_id = %request.id, "execution parked for approval");
        self.ledger
            .record(
                AuditLogEntry::automatic(execution.workspace_id(), "approval_requested")
                    .team(execution.team_id())
                    .agent(Some(step.agent_id))
                    .execution(execution.id())
                    .context(json!({
                        "step_id": step.id,
                        "action": step.action,
                        "approval_id": request.id,
                    })),
            )
            .await;
        Ok(())
    }

    /// Invokes the step's action, retrying retryable failures with backoff
    async fn invoke(&self, step: &Step, execution: &WorkflowExecution) -> StepResult {
        let started_at = Utc::now();
        let max_attempts = step.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.metrics.increment(Counter::StepAttempt);

            let error = match self.attempt(step, execution).await {
                Ok(output) => return StepResult::completed(&step.id, output, attempt, started_at),
                Err(e) => e,
            };

            if error.is_retryable() && attempt < max_attempts {
                let delay = self.backoff.delay_for(step.retry.backoff_ms, attempt);
                self.metrics.increment(Counter::StepRetry);
                tracing::warn!(
                    step_id = %step.id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "step attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            self.metrics.increment(Counter::StepFailed);
            tracing::error!(step_id = %step.id, attempt, error = %error, "step failed");
            return StepResult::failed(&step.id, error.to_string(), attempt, started_at);
        }
    }

    /// One attempt: load the step's agent, then run the action under the
    /// step timeout
    async fn attempt(&self, step: &Step, execution: &WorkflowExecution) -> Result<Value, AttemptError> {
        let agent = self
            .agents
            .find_by_id(execution.workspace_id(), step.agent_id)
            .await?
            .ok_or(AgentError::AgentNotFound(step.agent_id))?;

        let call = self
            .worker
            .perform(&agent, step.action, &step.inputs, execution.context());
        match tokio::time::timeout(Duration::from_millis(step.timeout_ms), call).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                self.metrics.increment(Counter::StepTimeout);
                Err(AgentError::Timeout(step.timeout_ms).into())
            }
        }
    }

    /// Records a step result and moves the pointer
    ///
    /// With no next step the execution completes, or fails when `failure`
    /// is set. If someone paused or cancelled the execution while the step
    /// ran, their status wins: the result is still recorded, and a paused
    /// execution still moves its pointer so resuming does not repeat work.
    async fn finish_step(
        &self,
        execution: &mut WorkflowExecution,
        step: &Step,
        result: StepResult,
        next: Option<String>,
        failure: Option<String>,
    ) -> EngineResult<()> {
        let expected = execution.status();
        let mut updated = execution.clone();
        updated.record_step(result.clone());
        updated.advance_to(next.clone());
        if next.is_none() {
            match &failure {
                Some(reason) => updated.fail(reason.clone())?,
                None => updated.transition_to(ExecutionStatus::Completed)?,
            }
        }

        match self.tracker.commit(&mut updated, expected).await {
            Ok(()) => *execution = updated,
            Err(EngineError::Conflict(_)) => {
                let mut fresh = self.tracker.load(execution.workspace_id(), execution.id()).await?;
                tracing::info!(
                    execution_id = %fresh.id(),
                    status = %fresh.status(),
                    "execution changed while step ran"
                );
                fresh.record_step(result.clone());
                if fresh.status() == ExecutionStatus::Paused {
                    fresh.advance_to(next);
                }
                let expected = fresh.status();
                self.tracker.commit(&mut fresh, expected).await?;
                *execution = fresh;
            }
            Err(e) => return Err(e),
        }

        self.announce_step(execution, step, &result).await;
        Ok(())
    }

    async fn announce_step(&self, execution: &WorkflowExecution, step: &Step, result: &StepResult) {
        self.broadcaster.publish(ActivityEvent::StepFinished {
            workspace_id: execution.workspace_id(),
            execution_id: execution.id(),
            step_id: step.id.clone(),
            success: result.succeeded(),
        });
        self.ledger
            .record(
                AuditLogEntry::automatic(execution.workspace_id(), "step_executed")
                    .team(execution.team_id())
                    .agent(Some(step.agent_id))
                    .execution(execution.id())
                    .success(result.status != StepStatus::Failed)
                    .context(json!({
                        "step_id": step.id,
                        "action": step.action,
                        "status": result.status,
                        "attempts": result.attempts,
                        "error": result.error,
                    })),
            )
            .await;
    }

    /// Applies `change` to a fresh copy and commits it, retrying when the
    /// step loop wrote in between
    async fn update<F>(&self, workspace_id: Uuid, execution_id: Uuid, change: F) -> EngineResult<WorkflowExecution>
    where
        F: Fn(&mut WorkflowExecution) -> EngineResult<()>,
    {
        for _ in 0..CONFLICT_RETRIES {
            let mut execution = self.tracker.load(workspace_id, execution_id).await?;
            let expected = execution.status();
            change(&mut execution)?;
            match self.tracker.commit(&mut execution, expected).await {
                Ok(()) => return Ok(execution),
                Err(EngineError::Conflict(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Err(EngineError::Conflict(execution_id))
    }

    async fn commit_or_reload(&self, execution: &mut WorkflowExecution, expected: ExecutionStatus) -> EngineResult<()> {
        match self.tracker.commit(execution, expected).await {
            Err(EngineError::Conflict(_)) => {
                *execution = self.tracker.load(execution.workspace_id(), execution.id()).await?;
                Ok(())
            }
            other => other,
        }
    }

    async fn workflow_of(&self, execution: &WorkflowExecution) -> EngineResult<Workflow> {
        let workflow_id = execution
            .workflow_id()
            .ok_or_else(|| EngineError::validation("Objective runs are driven by the orchestrator"))?;
        self.workflows
            .find_by_id(execution.workspace_id(), workflow_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Workflow", workflow_id))
    }

    async fn load_team(&self, workflow: &Workflow) -> EngineResult<Option<Team>> {
        let Some(team_id) = workflow.team_id else {
            return Ok(None);
        };
        self.teams
            .find_by_id(workflow.workspace_id, team_id)
            .await?
            .map(Some)
            .ok_or_else(|| EngineError::not_found("Team", team_id))
    }

    async fn audit_human(&self, execution: &WorkflowExecution, action_type: &str, actor: Uuid, context: Value) {
        let mut context = context;
        if let Value::Object(fields) = &mut context {
            fields.insert("actor".to_string(), json!(actor));
            fields.insert("status".to_string(), json!(execution.status()));
        }
        self.ledger
            .record(
                AuditLogEntry::human(execution.workspace_id(), action_type)
                    .team(execution.team_id())
                    .execution(execution.id())
                    .context(context),
            )
            .await;
    }
}
