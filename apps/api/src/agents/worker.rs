use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use super::completion::{CompletionClient, CompletionRequest};
use super::errors::{AgentError, AgentResult};
use super::prompts::{library, PromptTemplate};
use super::types::{extract_json, TaskOutput};
use crate::domain::agent::Agent;
use crate::domain::workflow::conditions::lookup;
use crate::domain::workflow::{StepAction, StepInputs};

/// Runs an agent's work through the completion service
///
/// Used by the workflow engine for step actions and by the orchestrator for
/// delegated tasks. Holds no per-run state.
#[derive(Clone)]
pub struct AgentWorker {
    client: Arc<dyn CompletionClient>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl AgentWorker {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            max_tokens: 2048,
            temperature: 0.4,
        }
    }

    /// Performs a workflow step action and returns its structured output
    ///
    /// Model output that is not JSON is kept as `{"text": ...}`.
    pub async fn perform(
        &self,
        agent: &Agent,
        action: StepAction,
        inputs: &StepInputs,
        context: &Map<String, Value>,
    ) -> AgentResult<Value> {
        if !agent.is_active() {
            return Err(AgentError::AgentInactive(agent.id));
        }

        let template = library::for_action(action);
        let mut vars = agent_vars(agent);
        vars.insert("instructions".to_string(), inputs.instructions.clone());
        vars.insert("parameters".to_string(), format_parameters(inputs));
        vars.insert(
            "context".to_string(),
            serde_json::to_string_pretty(&select_context(context, &inputs.context_keys))?,
        );

        let text = self.complete(&template, &vars).await?;
        Ok(extract_json(&text).unwrap_or_else(|| json!({ "text": text })))
    }

    /// Executes a task the coordinator delegated to `agent`
    pub async fn execute_task(
        &self,
        agent: &Agent,
        task_id: Uuid,
        task: &str,
        objective: &str,
    ) -> AgentResult<TaskOutput> {
        if !agent.is_active() {
            return Err(AgentError::AgentInactive(agent.id));
        }

        let template = library::delegated_task();
        let mut vars = agent_vars(agent);
        vars.insert(
            "instructions".to_string(),
            agent.instructions.clone().unwrap_or_default(),
        );
        vars.insert("objective".to_string(), objective.to_string());
        vars.insert("task".to_string(), task.to_string());

        let text = self.complete(&template, &vars).await?;
        let (summary, result) = match extract_json(&text) {
            Some(Value::Object(mut obj)) => {
                let summary = obj
                    .remove("summary")
                    .and_then(|s| s.as_str().map(str::to_string))
                    .unwrap_or_else(|| text.trim().to_string());
                let result = obj.remove("result").unwrap_or(Value::Object(obj));
                (summary, result)
            }
            Some(other) => (text.trim().to_string(), other),
            None => (text.trim().to_string(), json!({ "text": text.trim() })),
        };

        if summary.is_empty() {
            return Err(AgentError::TaskExecutionFailed(format!(
                "Agent {} returned an empty result",
                agent.id
            )));
        }

        Ok(TaskOutput {
            task_id,
            agent_id: agent.id,
            summary,
            result,
        })
    }

    async fn complete(&self, template: &PromptTemplate, vars: &HashMap<String, String>) -> AgentResult<String> {
        let request = CompletionRequest {
            template: template.name.clone(),
            system: template.render_system(vars),
            prompt: template.render(vars),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        let response = self.client.complete(request).await?;
        Ok(response.text)
    }
}

fn agent_vars(agent: &Agent) -> HashMap<String, String> {
    let mut vars = HashMap::new();
    vars.insert("agent_name".to_string(), agent.name.clone());
    vars.insert("capability".to_string(), agent.capability.clone());
    vars.insert("persona".to_string(), agent.instructions.clone().unwrap_or_default());
    vars
}

fn format_parameters(inputs: &StepInputs) -> String {
    if inputs.parameters.is_empty() {
        return "(none)".to_string();
    }
    inputs
        .parameters
        .iter()
        .map(|(k, v)| format!("- {}: {}", k, v))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The whole context, or only the listed keys when any are given
fn select_context(context: &Map<String, Value>, keys: &[String]) -> Value {
    if keys.is_empty() {
        return Value::Object(context.clone());
    }
    let selected: Map<String, Value> = keys
        .iter()
        .map(|key| (key.clone(), lookup(context, key).cloned().unwrap_or(Value::Null)))
        .collect();
    Value::Object(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::completion::{CompletionError, CompletionResponse};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Echo {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    impl Echo {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for Echo {
        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
            self.seen.lock().unwrap().push(request);
            Ok(CompletionResponse::text(self.reply.clone()))
        }
    }

    fn active_agent() -> Agent {
        let mut agent = Agent::new(Uuid::new_v4(), "Scout".to_string(), "research".to_string()).unwrap();
        agent.activate().unwrap();
        agent
    }

    #[tokio::test]
    async fn perform_parses_json_output() {
        let client = Echo::new(r#"{"score": 91}"#);
        let worker = AgentWorker::new(client.clone());

        let output = worker
            .perform(&active_agent(), StepAction::Analyze, &StepInputs::new("Score the lead"), &Map::new())
            .await
            .unwrap();

        assert_eq!(output, json!({"score": 91}));
        let seen = client.seen.lock().unwrap();
        assert_eq!(seen[0].template, "analyze");
        assert!(seen[0].prompt.contains("Score the lead"));
        assert!(seen[0].system.contains("Scout"));
    }

    #[tokio::test]
    async fn perform_wraps_plain_text() {
        let worker = AgentWorker::new(Echo::new("All good"));

        let output = worker
            .perform(&active_agent(), StepAction::Summarize, &StepInputs::new("Sum up"), &Map::new())
            .await
            .unwrap();

        assert_eq!(output, json!({"text": "All good"}));
    }

    #[tokio::test]
    async fn perform_passes_only_selected_context() {
        let client = Echo::new("{}");
        let worker = AgentWorker::new(client.clone());
        let mut context = Map::new();
        context.insert("lead".to_string(), json!({"name": "Acme", "secret": "x"}));
        context.insert("other".to_string(), json!("hidden"));

        worker
            .perform(
                &active_agent(),
                StepAction::Review,
                &StepInputs::new("Check").with_context_key("lead.name"),
                &context,
            )
            .await
            .unwrap();

        let prompt = client.seen.lock().unwrap()[0].prompt.clone();
        assert!(prompt.contains("Acme"));
        assert!(!prompt.contains("hidden"));
    }

    #[tokio::test]
    async fn inactive_agent_cannot_work() {
        let worker = AgentWorker::new(Echo::new("{}"));
        let draft = Agent::new(Uuid::new_v4(), "Idle".to_string(), "ops".to_string()).unwrap();

        let err = worker
            .perform(&draft, StepAction::Notify, &StepInputs::new("Ping"), &Map::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::AgentInactive(id) if id == draft.id));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn execute_task_splits_summary_and_result() {
        let worker = AgentWorker::new(Echo::new(
            r#"{"summary": "Found 3 competitors", "result": {"competitors": ["a", "b", "c"]}}"#,
        ));
        let agent = active_agent();
        let task_id = Uuid::new_v4();

        let output = worker
            .execute_task(&agent, task_id, "Find competitors", "Launch plan")
            .await
            .unwrap();

        assert_eq!(output.task_id, task_id);
        assert_eq!(output.agent_id, agent.id);
        assert_eq!(output.summary, "Found 3 competitors");
        assert_eq!(output.result, json!({"competitors": ["a", "b", "c"]}));
    }
}
