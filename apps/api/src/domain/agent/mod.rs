// Agent domain module
// Agents are owned by a workspace and referenced (never owned) by teams and steps

#![allow(clippy::module_inception)]

pub mod agent;
pub mod value_objects;

pub use agent::Agent;
pub use value_objects::AgentStatus;
