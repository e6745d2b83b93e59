use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Comparison applied by a step condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Contains,
    NotContains,
    Exists,
    NotExists,
}

impl ConditionOperator {
    fn needs_value(&self) -> bool {
        !matches!(self, ConditionOperator::Exists | ConditionOperator::NotExists)
    }

    fn is_ordering(&self) -> bool {
        matches!(
            self,
            ConditionOperator::GreaterThan
                | ConditionOperator::GreaterThanOrEqual
                | ConditionOperator::LessThan
                | ConditionOperator::LessThanOrEqual
        )
    }
}

/// A `field / operator / value` guard evaluated before a step runs
///
/// `field` is a dot path into the execution's accumulated context, e.g.
/// `analyze.sentiment` or `leads.0.score`.
///
/// # Example
/// ```
/// use ghostpirates_orchestrator::domain::workflow::{Condition, ConditionOperator};
/// use serde_json::json;
///
/// let condition = Condition::new("analyze.score", ConditionOperator::GreaterThan, json!(0.5));
/// let context = json!({"analyze": {"score": 0.9}});
///
/// assert!(condition.evaluate(context.as_object().unwrap()));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Condition {
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value: Some(value),
        }
    }

    pub fn exists(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator: ConditionOperator::Exists,
            value: None,
        }
    }

    /// Rejects conditions that could never be evaluated meaningfully
    pub fn validate(&self) -> Result<(), String> {
        if self.field.trim().is_empty() {
            return Err("Condition field cannot be empty".to_string());
        }
        match (&self.value, self.operator.needs_value()) {
            (None, true) => Err(format!(
                "Condition on '{}' requires a value for {:?}",
                self.field, self.operator
            )),
            (Some(value), true) if self.operator.is_ordering() && !value.is_number() => {
                Err(format!(
                    "Condition on '{}' compares with {:?} and needs a numeric value",
                    self.field, self.operator
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn evaluate(&self, context: &Map<String, Value>) -> bool {
        let actual = lookup(context, &self.field);

        match self.operator {
            ConditionOperator::Exists => actual.is_some_and(|v| !v.is_null()),
            ConditionOperator::NotExists => actual.map_or(true, Value::is_null),
            ConditionOperator::Equals => match (actual, &self.value) {
                (Some(a), Some(expected)) => loosely_equal(a, expected),
                _ => false,
            },
            ConditionOperator::NotEquals => match (actual, &self.value) {
                (Some(a), Some(expected)) => !loosely_equal(a, expected),
                (None, Some(_)) => true,
                _ => false,
            },
            ConditionOperator::GreaterThan => compare(actual, &self.value, |a, b| a > b),
            ConditionOperator::GreaterThanOrEqual => compare(actual, &self.value, |a, b| a >= b),
            ConditionOperator::LessThan => compare(actual, &self.value, |a, b| a < b),
            ConditionOperator::LessThanOrEqual => compare(actual, &self.value, |a, b| a <= b),
            ConditionOperator::Contains => match (actual, &self.value) {
                (Some(a), Some(needle)) => contains(a, needle),
                _ => false,
            },
            ConditionOperator::NotContains => match (actual, &self.value) {
                (Some(a), Some(needle)) => !contains(a, needle),
                (None, Some(_)) => true,
                _ => false,
            },
        }
    }
}

/// True when every condition holds; an empty list always holds
pub fn all_hold(conditions: &[Condition], context: &Map<String, Value>) -> bool {
    conditions.iter().all(|c| c.evaluate(context))
}

/// Resolves a dot path against the context, indexing arrays by position
pub fn lookup<'a>(context: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = context.get(segments.next()?)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn loosely_equal(actual: &Value, expected: &Value) -> bool {
    if actual == expected {
        return true;
    }
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => match (actual, expected) {
            (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
            _ => false,
        },
    }
}

fn compare(actual: Option<&Value>, expected: &Option<Value>, op: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(as_number), expected.as_ref().and_then(as_number)) {
        (Some(a), Some(b)) => op(a, b),
        _ => false,
    }
}

fn contains(haystack: &Value, needle: &Value) -> bool {
    match haystack {
        Value::String(s) => needle
            .as_str()
            .map(|n| s.to_lowercase().contains(&n.to_lowercase()))
            .unwrap_or(false),
        Value::Array(items) => items.iter().any(|item| loosely_equal(item, needle)),
        Value::Object(map) => needle.as_str().is_some_and(|key| map.contains_key(key)),
        _ => false,
    }
}
