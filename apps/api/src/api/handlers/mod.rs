pub mod agents;
pub mod approvals;
pub mod audit;
pub mod executions;
pub mod health;
pub mod messages;
pub mod teams;
pub mod workflows;
