// Approval domain module
// Human-approval waitpoints that park executions

#![allow(clippy::module_inception)]

pub mod approval;

pub use approval::{AlreadyResolved, ApprovalDecision, ApprovalRequest, ApprovalStatus, DecisionRecord};
