//! Ghost Pirates Orchestrator Library
//!
//! Multi-agent orchestration for the Ghost Pirates API: teams of agents run
//! against an objective or a pre-authored workflow, talk over a message bus,
//! park for human approval, and leave an append-only audit trail.

pub mod agents;
pub mod api;
pub mod auth;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod orchestration;
