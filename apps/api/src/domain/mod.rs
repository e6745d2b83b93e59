// Domain layer module exports
// Following Hexagonal Architecture and DDD principles
// Domain is independent of infrastructure concerns

pub mod agent;
pub mod approval;
pub mod audit;
pub mod execution;
pub mod message;
pub mod repositories;
pub mod team;
pub mod workflow;
