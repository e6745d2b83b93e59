use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Actions a workflow step (or an approval policy) can name
///
/// This is the closed dispatch table of supported capabilities. Action names
/// arrive as strings at the API boundary and are parsed here; an unknown name
/// is a validation error, never a runtime failure inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum StepAction {
    Research,
    Analyze,
    Summarize,
    GenerateContent,
    Review,
    Classify,
    SendEmail,
    Notify,
    Handoff,
}

impl StepAction {
    pub const ALL: [StepAction; 9] = [
        StepAction::Research,
        StepAction::Analyze,
        StepAction::Summarize,
        StepAction::GenerateContent,
        StepAction::Review,
        StepAction::Classify,
        StepAction::SendEmail,
        StepAction::Notify,
        StepAction::Handoff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::Research => "research",
            StepAction::Analyze => "analyze",
            StepAction::Summarize => "summarize",
            StepAction::GenerateContent => "generate_content",
            StepAction::Review => "review",
            StepAction::Classify => "classify",
            StepAction::SendEmail => "send_email",
            StepAction::Notify => "notify",
            StepAction::Handoff => "handoff",
        }
    }
}

impl FromStr for StepAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StepAction::ALL
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| format!("Unknown action: {}", s))
    }
}

impl TryFrom<String> for StepAction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StepAction> for String {
    fn from(action: StepAction) -> Self {
        action.as_str().to_string()
    }
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry policy for a single step
///
/// Attempt `n` (1-based) that fails with a retryable error waits
/// `backoff_ms * 2^(n-1)` before attempt `n + 1`, capped by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl RetryConfig {
    pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be at least 1".to_string());
        }
        if self.max_attempts > Self::MAX_ATTEMPTS_LIMIT {
            return Err(format!(
                "max_attempts cannot exceed {}",
                Self::MAX_ATTEMPTS_LIMIT
            ));
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 1_000,
        }
    }
}

/// Typed inputs handed to a step's action
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepInputs {
    /// What the agent should do for this step
    pub instructions: String,
    /// Context keys (dot paths) whose values are passed to the agent
    #[serde(default)]
    pub context_keys: Vec<String>,
    /// Literal named parameters, e.g. recipient or tone
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl StepInputs {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self {
            instructions: instructions.into(),
            ..Self::default()
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_context_key(mut self, key: impl Into<String>) -> Self {
        self.context_keys.push(key.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_actions() {
        for action in StepAction::ALL {
            assert_eq!(action.as_str().parse::<StepAction>().unwrap(), action);
        }
    }

    #[test]
    fn unknown_action_is_rejected() {
        let err = "launch_rockets".parse::<StepAction>().unwrap_err();
        assert!(err.contains("Unknown action"));
    }

    #[test]
    fn action_deserializes_from_name() {
        let action: StepAction = serde_json::from_str("\"send_email\"").unwrap();
        assert_eq!(action, StepAction::SendEmail);
        assert!(serde_json::from_str::<StepAction>("\"teleport\"").is_err());
    }

    #[test]
    fn retry_config_bounds() {
        assert!(RetryConfig { max_attempts: 0, backoff_ms: 10 }.validate().is_err());
        assert!(RetryConfig { max_attempts: 11, backoff_ms: 10 }.validate().is_err());
        assert!(RetryConfig { max_attempts: 3, backoff_ms: 1000 }.validate().is_ok());
    }

    #[test]
    fn retry_config_deserializes() {
        let config: RetryConfig =
            serde_json::from_str(r#"{"max_attempts":3,"backoff_ms":1000}"#).unwrap();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_ms, 1000);
    }
}
