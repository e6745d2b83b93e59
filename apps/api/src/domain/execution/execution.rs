use super::value_objects::{ExecutionStatus, StepStatus, TransitionError};
use crate::domain::message::Priority;
use crate::domain::workflow::Workflow;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

/// What drives an execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionSource {
    /// Graph-driven: a pre-authored workflow
    Workflow { workflow_id: Uuid },
    /// Objective-driven: a team run planned turn by turn by its coordinator
    Objective { objective: String, priority: Priority },
}

/// Recorded outcome of the latest attempt cycle for one step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Attempts consumed in this cycle; a retry starts a fresh cycle
    pub attempts: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl StepResult {
    pub fn completed(step_id: &str, output: Value, attempts: u32, started_at: DateTime<Utc>) -> Self {
        Self::build(step_id, StepStatus::Completed, Some(output), None, attempts, started_at)
    }

    pub fn failed(step_id: &str, error: impl Into<String>, attempts: u32, started_at: DateTime<Utc>) -> Self {
        Self::build(step_id, StepStatus::Failed, None, Some(error.into()), attempts, started_at)
    }

    pub fn skipped(step_id: &str) -> Self {
        Self::build(step_id, StepStatus::Skipped, None, None, 0, Utc::now())
    }

    pub fn awaiting_approval(step_id: &str, approval_id: Uuid) -> Self {
        let output = serde_json::json!({ "approval_id": approval_id });
        Self::build(step_id, StepStatus::AwaitingApproval, Some(output), None, 0, Utc::now())
    }

    pub fn rejected(step_id: &str, reason: Option<String>) -> Self {
        let error = reason.unwrap_or_else(|| "Rejected by reviewer".to_string());
        Self::build(step_id, StepStatus::Rejected, None, Some(error), 0, Utc::now())
    }

    fn build(
        step_id: &str,
        status: StepStatus,
        output: Option<Value>,
        error: Option<String>,
        attempts: u32,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            step_id: step_id.to_string(),
            status,
            output,
            error,
            attempts,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == StepStatus::Completed
    }
}

/// One observed status change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
    pub at: DateTime<Utc>,
}

/// WorkflowExecution aggregate root
///
/// Tracks one run of a workflow (or one objective run of a team): status,
/// step pointer, per-step results and the context accumulated from step
/// outputs.
///
/// # Invariants
/// - Status only changes along the edges of [`ExecutionStatus::can_transition_to`]
/// - Every status change is appended to `history`
/// - `revision` increases by one with every persisted write; stores use it
///   together with the status for conditional updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    id: Uuid,
    workspace_id: Uuid,
    source: ExecutionSource,
    team_id: Option<Uuid>,
    status: ExecutionStatus,
    current_step_id: Option<String>,
    step_results: BTreeMap<String, StepResult>,
    step_log: Vec<String>,
    context: Map<String, Value>,
    history: Vec<StatusChange>,
    error: Option<String>,
    revision: i64,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl WorkflowExecution {
    /// Creates a pending execution positioned at the workflow's entry step
    pub fn for_workflow(workflow: &Workflow) -> Self {
        Self::build(
            workflow.workspace_id,
            ExecutionSource::Workflow {
                workflow_id: workflow.id,
            },
            workflow.team_id,
            Some(workflow.entry_step().id.clone()),
        )
    }

    /// Creates a pending objective run for a team
    pub fn for_objective(workspace_id: Uuid, team_id: Uuid, objective: String, priority: Priority) -> Self {
        Self::build(
            workspace_id,
            ExecutionSource::Objective { objective, priority },
            Some(team_id),
            None,
        )
    }

    fn build(
        workspace_id: Uuid,
        source: ExecutionSource,
        team_id: Option<Uuid>,
        current_step_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            workspace_id,
            source,
            team_id,
            status: ExecutionStatus::Pending,
            current_step_id,
            step_results: BTreeMap::new(),
            step_log: Vec::new(),
            context: Map::new(),
            history: Vec::new(),
            error: None,
            revision: 0,
            created_at: now,
            started_at: None,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Moves to `next`, rejecting edges outside the state machine
    pub fn transition_to(&mut self, next: ExecutionStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }

        let now = Utc::now();
        self.history.push(StatusChange {
            from: self.status,
            to: next,
            at: now,
        });
        self.status = next;
        self.updated_at = now;

        if next == ExecutionStatus::Running && self.started_at.is_none() {
            self.started_at = Some(now);
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Transitions to `Failed` and records the reason
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition_to(ExecutionStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Stores a step result, replacing any earlier one for the same step
    ///
    /// Outputs of completed steps are merged into the context twice: under
    /// the step id, and (for object outputs) key by key at the top level.
    pub fn record_step(&mut self, result: StepResult) {
        if result.succeeded() {
            if let Some(output) = &result.output {
                if let Value::Object(fields) = output {
                    for (key, value) in fields {
                        self.context.insert(key.clone(), value.clone());
                    }
                }
                self.context.insert(result.step_id.clone(), output.clone());
            }
        }
        self.step_log.push(result.step_id.clone());
        self.step_results.insert(result.step_id.clone(), result);
        self.updated_at = Utc::now();
    }

    pub fn advance_to(&mut self, next_step_id: Option<String>) {
        self.current_step_id = next_step_id;
        self.updated_at = Utc::now();
    }

    pub fn set_context_value(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
        self.updated_at = Utc::now();
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
    }

    /// Called by stores after a successful conditional write
    pub fn mark_persisted(&mut self) {
        self.revision += 1;
    }

    pub fn last_result(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.get(step_id)
    }

    pub fn workflow_id(&self) -> Option<Uuid> {
        match &self.source {
            ExecutionSource::Workflow { workflow_id } => Some(*workflow_id),
            ExecutionSource::Objective { .. } => None,
        }
    }

    pub fn objective(&self) -> Option<&str> {
        match &self.source {
            ExecutionSource::Objective { objective, .. } => Some(objective),
            ExecutionSource::Workflow { .. } => None,
        }
    }

    // ===== Getters =====

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn workspace_id(&self) -> Uuid {
        self.workspace_id
    }

    pub fn source(&self) -> &ExecutionSource {
        &self.source
    }

    pub fn team_id(&self) -> Option<Uuid> {
        self.team_id
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn current_step_id(&self) -> Option<&str> {
        self.current_step_id.as_deref()
    }

    pub fn step_results(&self) -> &BTreeMap<String, StepResult> {
        &self.step_results
    }

    /// Step ids in the order their results were recorded
    pub fn step_log(&self) -> &[String] {
        &self.step_log
    }

    pub fn context(&self) -> &Map<String, Value> {
        &self.context
    }

    pub fn history(&self) -> &[StatusChange] {
        &self.history
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn revision(&self) -> i64 {
        self.revision
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Reconstructs an execution from persistence layer data
    ///
    /// Only to be used by repository implementations.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persistence(
        id: Uuid,
        workspace_id: Uuid,
        source: ExecutionSource,
        team_id: Option<Uuid>,
        status: ExecutionStatus,
        current_step_id: Option<String>,
        step_results: BTreeMap<String, StepResult>,
        step_log: Vec<String>,
        context: Map<String, Value>,
        history: Vec<StatusChange>,
        error: Option<String>,
        revision: i64,
        created_at: DateTime<Utc>,
        started_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            workspace_id,
            source,
            team_id,
            status,
            current_step_id,
            step_results,
            step_log,
            context,
            history,
            error,
            revision,
            created_at,
            started_at,
            updated_at,
            completed_at,
        }
    }
}
