// Audit domain module
// Append-only ledger entries and their query filters

#![allow(clippy::module_inception)]

pub mod audit;

pub use audit::{AuditLogEntry, AuditQuery};
