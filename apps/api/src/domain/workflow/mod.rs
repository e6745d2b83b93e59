// Workflow domain module
// Contains the versioned step graph, typed step inputs, and condition guards

#![allow(clippy::module_inception)]

pub mod conditions;
pub mod value_objects;
pub mod workflow;

pub use conditions::{Condition, ConditionOperator};
pub use value_objects::{RetryConfig, StepAction, StepInputs};
pub use workflow::{Step, Workflow};
