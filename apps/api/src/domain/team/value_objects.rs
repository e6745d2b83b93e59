use crate::domain::workflow::StepAction;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Role an agent plays inside a team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Plans and delegates; at most one per team
    Coordinator,
    /// Executes delegated work
    Specialist,
}

/// How much a team may do without a human in the loop
///
/// - `Supervised`: every action needs approval
/// - `SemiAutonomous` / `Autonomous`: only actions listed in
///   `approval_required` need approval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutonomyLevel {
    Supervised,
    #[default]
    SemiAutonomous,
    Autonomous,
}

impl std::fmt::Display for AutonomyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AutonomyLevel::Supervised => write!(f, "supervised"),
            AutonomyLevel::SemiAutonomous => write!(f, "semi_autonomous"),
            AutonomyLevel::Autonomous => write!(f, "autonomous"),
        }
    }
}

/// Situation that triggers an escalation rule during an objective run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscalationCondition {
    /// Any delegated task in the latest turn failed
    TaskFailed,
    /// This many delegated tasks failed in a row
    ConsecutiveFailures { count: u32 },
    /// The run has used this many coordinator turns
    TurnsExceeded { turns: u32 },
}

/// What the orchestrator does when an escalation rule fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationAction {
    /// Announce on the activity stream only
    Notify,
    /// Post a status message to the team and record it in the audit log
    Escalate,
    /// Park the run in `paused` until someone resumes it
    Pause,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub condition: EscalationCondition,
    pub action: EscalationAction,
}

fn default_max_concurrent_tasks() -> u32 {
    3
}

/// Team-wide autonomy policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutonomyConfig {
    #[serde(default)]
    pub autonomy_level: AutonomyLevel,
    #[serde(default)]
    pub approval_required: BTreeSet<StepAction>,
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: u32,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
}

impl AutonomyConfig {
    pub const MAX_CONCURRENT_TASKS_LIMIT: u32 = 32;

    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent_tasks == 0 {
            return Err("max_concurrent_tasks must be at least 1".to_string());
        }
        if self.max_concurrent_tasks > Self::MAX_CONCURRENT_TASKS_LIMIT {
            return Err(format!(
                "max_concurrent_tasks cannot exceed {}",
                Self::MAX_CONCURRENT_TASKS_LIMIT
            ));
        }
        for rule in &self.escalation_rules {
            match rule.condition {
                EscalationCondition::ConsecutiveFailures { count: 0 } => {
                    return Err("consecutive_failures count must be at least 1".to_string())
                }
                EscalationCondition::TurnsExceeded { turns: 0 } => {
                    return Err("turns_exceeded turns must be at least 1".to_string())
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn requires_approval(&self, action: StepAction) -> bool {
        self.autonomy_level == AutonomyLevel::Supervised || self.approval_required.contains(&action)
    }
}

impl Default for AutonomyConfig {
    fn default() -> Self {
        Self {
            autonomy_level: AutonomyLevel::default(),
            approval_required: BTreeSet::new(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            escalation_rules: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_config_is_valid() {
        assert!(AutonomyConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let config = AutonomyConfig {
            max_concurrent_tasks: 0,
            ..AutonomyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_count_escalation_is_rejected() {
        let config = AutonomyConfig {
            escalation_rules: vec![EscalationRule {
                condition: EscalationCondition::ConsecutiveFailures { count: 0 },
                action: EscalationAction::Pause,
            }],
            ..AutonomyConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn supervised_requires_approval_for_everything() {
        let config = AutonomyConfig {
            autonomy_level: AutonomyLevel::Supervised,
            ..AutonomyConfig::default()
        };
        assert!(config.requires_approval(StepAction::Summarize));
        assert!(config.requires_approval(StepAction::SendEmail));
    }

    #[test]
    fn listed_actions_require_approval() {
        let config = AutonomyConfig {
            autonomy_level: AutonomyLevel::Autonomous,
            approval_required: [StepAction::SendEmail].into_iter().collect(),
            ..AutonomyConfig::default()
        };
        assert!(config.requires_approval(StepAction::SendEmail));
        assert!(!config.requires_approval(StepAction::Analyze));
    }

    #[test]
    fn config_deserializes_from_json() {
        let config: AutonomyConfig = serde_json::from_value(json!({
            "autonomy_level": "semi_autonomous",
            "approval_required": ["send_email"],
            "escalation_rules": [
                {"condition": {"type": "consecutive_failures", "count": 2}, "action": "pause"}
            ]
        }))
        .unwrap();

        assert_eq!(config.max_concurrent_tasks, 3);
        assert!(config.approval_required.contains(&StepAction::SendEmail));
        assert_eq!(
            config.escalation_rules[0].condition,
            EscalationCondition::ConsecutiveFailures { count: 2 }
        );
    }

    #[test]
    fn unknown_approval_action_is_rejected() {
        let result = serde_json::from_value::<AutonomyConfig>(json!({
            "approval_required": ["wire_money"]
        }));
        assert!(result.is_err());
    }
}
