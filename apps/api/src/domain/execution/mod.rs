// Execution domain module
// Workflow executions and objective runs share one state machine

#![allow(clippy::module_inception)]

pub mod execution;
pub mod value_objects;

pub use execution::{ExecutionSource, StatusChange, StepResult, WorkflowExecution};
pub use value_objects::{ExecutionStatus, StepStatus, TransitionError};
