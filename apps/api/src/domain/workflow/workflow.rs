use super::conditions::Condition;
use super::value_objects::{RetryConfig, StepAction, StepInputs};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use uuid::Uuid;

pub const DEFAULT_STEP_TIMEOUT_MS: u64 = 120_000;

fn default_timeout_ms() -> u64 {
    DEFAULT_STEP_TIMEOUT_MS
}

/// One node of a workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub agent_id: Uuid,
    pub action: StepAction,
    #[serde(default)]
    pub inputs: StepInputs,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub on_success: Option<String>,
    #[serde(default)]
    pub on_failure: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Step {
    pub fn new(id: impl Into<String>, agent_id: Uuid, action: StepAction, inputs: StepInputs) -> Self {
        Self {
            id: id.into(),
            agent_id,
            action,
            inputs,
            conditions: Vec::new(),
            on_success: None,
            on_failure: None,
            timeout_ms: DEFAULT_STEP_TIMEOUT_MS,
            retry: RetryConfig::default(),
        }
    }

    pub fn on_success(mut self, step_id: impl Into<String>) -> Self {
        self.on_success = Some(step_id.into());
        self
    }

    pub fn on_failure(mut self, step_id: impl Into<String>) -> Self {
        self.on_failure = Some(step_id.into());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

/// A pre-authored, versioned step graph
///
/// Workflows are immutable once an execution references them. Editing a
/// referenced workflow goes through [`Workflow::revise`], which produces a new
/// version with its own id and a back-reference to the previous one.
///
/// # Invariants
/// - At least one step; the first step is the entry point
/// - Step ids are unique and non-empty
/// - Every `on_success` / `on_failure` pointer names an existing step
/// - Conditions and retry configs are well-formed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub workspace_id: Uuid,
    /// Team whose autonomy policy gates this workflow's actions
    pub team_id: Option<Uuid>,
    pub name: String,
    pub version: i32,
    pub previous_version_id: Option<Uuid>,
    pub steps: Vec<Step>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates version 1 of a workflow
    pub fn new(
        workspace_id: Uuid,
        team_id: Option<Uuid>,
        name: String,
        steps: Vec<Step>,
        created_by: Uuid,
    ) -> Result<Self, String> {
        if name.trim().is_empty() {
            return Err("Workflow name cannot be empty".to_string());
        }
        validate_steps(&steps)?;

        Ok(Self {
            id: Uuid::new_v4(),
            workspace_id,
            team_id,
            name: name.trim().to_string(),
            version: 1,
            previous_version_id: None,
            steps,
            created_by,
            created_at: Utc::now(),
        })
    }

    /// Produces the next version of this workflow with new steps
    pub fn revise(&self, name: Option<String>, steps: Vec<Step>, revised_by: Uuid) -> Result<Self, String> {
        let mut next = Workflow::new(
            self.workspace_id,
            self.team_id,
            name.unwrap_or_else(|| self.name.clone()),
            steps,
            revised_by,
        )?;
        next.version = self.version + 1;
        next.previous_version_id = Some(self.id);
        Ok(next)
    }

    /// Replaces name and steps in place; only valid while unreferenced
    pub fn edit(&mut self, name: Option<String>, steps: Vec<Step>) -> Result<(), String> {
        validate_steps(&steps)?;
        if let Some(name) = name {
            if name.trim().is_empty() {
                return Err("Workflow name cannot be empty".to_string());
            }
            self.name = name.trim().to_string();
        }
        self.steps = steps;
        Ok(())
    }

    pub fn entry_step(&self) -> &Step {
        &self.steps[0]
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Distinct agents referenced by the steps
    pub fn agent_ids(&self) -> BTreeSet<Uuid> {
        self.steps.iter().map(|s| s.agent_id).collect()
    }
}

fn validate_steps(steps: &[Step]) -> Result<(), String> {
    if steps.is_empty() {
        return Err("Workflow must have at least one step".to_string());
    }

    let mut ids = HashSet::new();
    for step in steps {
        if step.id.trim().is_empty() {
            return Err("Step id cannot be empty".to_string());
        }
        if !ids.insert(step.id.as_str()) {
            return Err(format!("Duplicate step id: {}", step.id));
        }
    }

    for step in steps {
        for pointer in [&step.on_success, &step.on_failure].into_iter().flatten() {
            if !ids.contains(pointer.as_str()) {
                return Err(format!(
                    "Step '{}' points to unknown step '{}'",
                    step.id, pointer
                ));
            }
        }
        if step.timeout_ms == 0 {
            return Err(format!("Step '{}' must have a positive timeout", step.id));
        }
        step.retry
            .validate()
            .map_err(|e| format!("Step '{}': {}", step.id, e))?;
        for condition in &step.conditions {
            condition
                .validate()
                .map_err(|e| format!("Step '{}': {}", step.id, e))?;
        }
        if step.inputs.instructions.trim().is_empty() {
            return Err(format!("Step '{}' needs instructions", step.id));
        }
    }

    Ok(())
}
