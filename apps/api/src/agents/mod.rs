// Agent system modules
//
// AI-backed agents: the coordinator that plans objective runs turn by turn,
// the worker that performs step actions and delegated tasks, and the
// completion port both of them call.

pub mod completion;
pub mod errors;
pub mod manager;
pub mod prompts;
pub mod state;
pub mod types;
pub mod worker;

// Re-export main types
pub use completion::{CompletionClient, CompletionError, CompletionRequest, CompletionResponse};
pub use errors::{AgentError, AgentResult};
pub use manager::{Coordinator, PlanningContext};
pub use state::RunState;
pub use types::{Assignment, CoordinatorDecision, DelegationOutcome, TaskOutput, TurnRecord};
pub use worker::AgentWorker;
