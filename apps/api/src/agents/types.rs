use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Output from a specialist's delegated task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task_id: Uuid,
    pub agent_id: Uuid,
    pub summary: String,
    pub result: Value,
}

/// One unit of delegated work chosen by the coordinator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub agent_id: Uuid,
    pub task: String,
}

/// The coordinator's decision for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CoordinatorDecision {
    Delegate {
        assignments: Vec<Assignment>,
        #[serde(default)]
        rationale: String,
    },
    Complete {
        summary: String,
    },
}

/// What came of one assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationOutcome {
    pub agent_id: Uuid,
    pub task: String,
    pub success: bool,
    /// Result summary, or the error when the task failed
    pub summary: String,
}

/// A finished coordinator turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn: u32,
    pub outcomes: Vec<DelegationOutcome>,
}

impl TurnRecord {
    pub fn any_failed(&self) -> bool {
        self.outcomes.iter().any(|o| !o.success)
    }
}

/// Pulls a JSON value out of model output
///
/// Accepts bare JSON, fenced code blocks, and JSON embedded in prose (the
/// outermost `{...}` span).
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim);
    if let Some(inner) = unfenced {
        if let Ok(value) = serde_json::from_str(inner) {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&trimmed[start..=end]).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_bare_fenced_and_embedded_json() {
        assert_eq!(extract_json(r#"{"a": 1}"#), Some(json!({"a": 1})));
        assert_eq!(extract_json("```json\n{\"a\": 2}\n```"), Some(json!({"a": 2})));
        assert_eq!(
            extract_json("Here is the plan: {\"a\": 3} Let me know."),
            Some(json!({"a": 3}))
        );
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn decision_deserializes_from_tagged_json() {
        let agent = Uuid::new_v4();
        let delegate: CoordinatorDecision = serde_json::from_value(json!({
            "action": "delegate",
            "assignments": [{"agent_id": agent, "task": "Research competitors"}]
        }))
        .unwrap();
        assert_eq!(
            delegate,
            CoordinatorDecision::Delegate {
                assignments: vec![Assignment {
                    agent_id: agent,
                    task: "Research competitors".to_string()
                }],
                rationale: String::new(),
            }
        );

        let complete: CoordinatorDecision =
            serde_json::from_value(json!({"action": "complete", "summary": "Done"})).unwrap();
        assert!(matches!(complete, CoordinatorDecision::Complete { .. }));
    }
}
