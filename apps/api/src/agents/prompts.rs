// Prompt templates for LLM interactions
//
// This module contains all prompt templates used by the agent system.
// Prompts are versioned for reproducibility.

use std::collections::HashMap;

/// Prompt template structure
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: String,
    pub version: String,
    pub system: String,
    pub user_template: String,
}

impl PromptTemplate {
    /// Render the user template, replacing each `{{name}}` with its variable
    ///
    /// Placeholders without a matching variable are left in place so a
    /// missing input is visible in the prompt rather than silently empty.
    pub fn render(&self, variables: &HashMap<String, String>) -> String {
        render(&self.user_template, variables)
    }

    pub fn render_system(&self, variables: &HashMap<String, String>) -> String {
        render(&self.system, variables)
    }
}

fn render(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match variables.get(key) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

pub mod library {
    use super::PromptTemplate;
    use crate::domain::workflow::StepAction;

    pub const COORDINATOR_TURN: &str = "coordinator_turn";
    pub const DELEGATED_TASK: &str = "delegated_task";

    pub fn coordinator_turn() -> PromptTemplate {
        PromptTemplate {
            name: COORDINATOR_TURN.to_string(),
            version: "1.0.0".to_string(),
            system: "You are the coordinator of a team of AI agents. You never do the work yourself; \
                     you decide which team members should work next and on what. \
                     Respond with a single JSON object and nothing else."
                .to_string(),
            user_template: "Objective: {{objective}}\n\
                            Team: {{team}}\n\
                            Turn: {{turn}}\n\
                            At most {{max_concurrent}} tasks run at the same time.\n\n\
                            Members:\n{{members}}\n\n\
                            Work so far:\n{{history}}\n\n\
                            Either delegate the next tasks:\n\
                            {\"action\": \"delegate\", \"rationale\": \"...\", \
                            \"assignments\": [{\"agent_id\": \"<member id>\", \"task\": \"...\"}]}\n\
                            or finish the run when the objective is met:\n\
                            {\"action\": \"complete\", \"summary\": \"...\"}"
                .to_string(),
        }
    }

    pub fn delegated_task() -> PromptTemplate {
        PromptTemplate {
            name: DELEGATED_TASK.to_string(),
            version: "1.0.0".to_string(),
            system: "You are {{agent_name}}, a specialist agent ({{capability}}) on a team. \
                     Complete the task you are given and report the result."
                .to_string(),
            user_template: "{{instructions}}\n\n\
                            Team objective: {{objective}}\n\n\
                            Your task: {{task}}\n\n\
                            Respond with JSON: {\"summary\": \"one paragraph\", \"result\": <any JSON>}"
                .to_string(),
        }
    }

    /// Template used when a workflow step invokes `action`
    pub fn for_action(action: StepAction) -> PromptTemplate {
        let (system, output) = match action {
            StepAction::Research => (
                "You research a topic and report verifiable findings.",
                "{\"findings\": [\"...\"], \"sources\": [\"...\"]}",
            ),
            StepAction::Analyze => (
                "You analyze the provided material and draw conclusions.",
                "{\"analysis\": \"...\", \"score\": <number 0-100>}",
            ),
            StepAction::Summarize => (
                "You write concise, faithful summaries.",
                "{\"summary\": \"...\"}",
            ),
            StepAction::GenerateContent => (
                "You write content in the requested tone and format.",
                "{\"title\": \"...\", \"body\": \"...\"}",
            ),
            StepAction::Review => (
                "You review work for quality and correctness.",
                "{\"approved\": <true|false>, \"comments\": [\"...\"]}",
            ),
            StepAction::Classify => (
                "You classify the input into exactly one of the given labels.",
                "{\"label\": \"...\", \"confidence\": <number 0-1>}",
            ),
            StepAction::SendEmail => (
                "You compose an email ready to be sent on behalf of the workspace.",
                "{\"to\": \"...\", \"subject\": \"...\", \"body\": \"...\"}",
            ),
            StepAction::Notify => (
                "You compose a short notification for the workspace's users.",
                "{\"channel\": \"...\", \"message\": \"...\"}",
            ),
            StepAction::Handoff => (
                "You prepare a handoff note so another agent can continue the work.",
                "{\"handoff_note\": \"...\", \"open_items\": [\"...\"]}",
            ),
        };

        PromptTemplate {
            name: action.as_str().to_string(),
            version: "1.0.0".to_string(),
            system: format!("You are {{{{agent_name}}}} ({{{{capability}}}}). {}", system),
            user_template: format!(
                "{{{{persona}}}}\n\n\
                 Instructions: {{{{instructions}}}}\n\n\
                 Parameters:\n{{{{parameters}}}}\n\n\
                 Context:\n{{{{context}}}}\n\n\
                 Respond with JSON only: {}",
                output
            ),
        }
    }
}
