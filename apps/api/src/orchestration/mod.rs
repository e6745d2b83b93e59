// Orchestration services
//
// Leaves first: audit ledger, approval gate, message bus, workflow engine
// and the objective-driven orchestrator on top. Services share the
// repositories, the activity broadcaster and the metrics collector.

pub mod approval_gate;
pub mod audit_ledger;
pub mod errors;
pub mod events;
pub mod executions;
pub mod message_bus;
pub mod metrics;
pub mod orchestrator;
pub mod rate_limit;
pub mod retry;
pub mod waitpoints;
pub mod workflow_engine;

pub use approval_gate::{ApprovalGate, Resolution};
pub use audit_ledger::AuditLedger;
pub use errors::{EngineError, EngineResult};
pub use events::{ActivityBroadcaster, ActivityEvent, ChannelBroadcaster};
pub use executions::ExecutionTracker;
pub use message_bus::{BroadcastReport, BroadcastRequest, Delivery, MessageBus};
pub use metrics::{Counter, InMemoryMetrics, MetricsCollector};
pub use orchestrator::{Orchestrator, RunReport};
pub use rate_limit::{FixedWindowRateLimiter, RateLimiter};
pub use retry::BackoffPolicy;
pub use waitpoints::Waitpoints;
pub use workflow_engine::{WorkflowEngine, DEFAULT_MAX_STEP_RUNS};

use std::sync::Arc;
use std::time::Duration;

use crate::agents::{AgentWorker, CompletionClient, Coordinator};
use crate::infrastructure::Repositories;

/// Tunables shared by the services
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Coordinator turns an objective run may use before it fails
    pub max_turns: u32,
    /// Upper bound for the wait between step attempts
    pub max_backoff: Duration,
    /// Requests per workspace user per minute
    pub rate_limit_per_minute: u32,
    /// Step runs one workflow execution may record before it fails
    pub max_workflow_steps: u32,
    pub broadcast_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_turns: 10,
            max_backoff: Duration::from_secs(30),
            rate_limit_per_minute: 120,
            max_workflow_steps: DEFAULT_MAX_STEP_RUNS,
            broadcast_capacity: 256,
        }
    }
}

/// Every orchestration service, wired to one set of repositories
#[derive(Clone)]
pub struct OrchestrationServices {
    pub repos: Repositories,
    pub bus: Arc<MessageBus>,
    pub engine: Arc<WorkflowEngine>,
    pub orchestrator: Arc<Orchestrator>,
    pub approvals: Arc<ApprovalGate>,
    pub ledger: Arc<AuditLedger>,
    pub executions: Arc<ExecutionTracker>,
    pub broadcaster: Arc<ChannelBroadcaster>,
    pub metrics: Arc<InMemoryMetrics>,
    pub rate_limiter: Arc<dyn RateLimiter>,
}

impl OrchestrationServices {
    /// Builds the services; call from inside a tokio runtime so failed
    /// audit writes can be redelivered
    pub fn build(repos: Repositories, completion: Arc<dyn CompletionClient>, settings: EngineSettings) -> Self {
        let broadcaster = Arc::new(ChannelBroadcaster::new(settings.broadcast_capacity));
        let metrics = Arc::new(InMemoryMetrics::new());
        let activity: Arc<dyn ActivityBroadcaster> = broadcaster.clone();
        let collector: Arc<dyn MetricsCollector> = metrics.clone();

        let ledger = Arc::new(AuditLedger::new(repos.audit.clone(), collector.clone()));
        let executions = Arc::new(ExecutionTracker::new(repos.executions.clone(), activity.clone()));
        let approvals = Arc::new(ApprovalGate::new(
            repos.approvals.clone(),
            Arc::new(Waitpoints::new()),
            ledger.clone(),
            activity.clone(),
            collector.clone(),
        ));
        let bus = Arc::new(MessageBus::new(
            repos.messages.clone(),
            repos.agents.clone(),
            repos.teams.clone(),
            activity.clone(),
            collector.clone(),
        ));

        let worker = AgentWorker::new(completion.clone());
        let engine = WorkflowEngine::new(
            &repos,
            executions.clone(),
            worker.clone(),
            approvals.clone(),
            ledger.clone(),
            activity.clone(),
            collector.clone(),
        )
        .with_backoff(BackoffPolicy::new(settings.max_backoff))
        .with_max_step_runs(settings.max_workflow_steps);
        let orchestrator = Orchestrator::new(
            &repos,
            executions.clone(),
            bus.clone(),
            Coordinator::new(completion),
            worker,
            ledger.clone(),
            activity,
            collector,
        )
        .with_max_turns(settings.max_turns);

        Self {
            repos,
            bus,
            engine: Arc::new(engine),
            orchestrator: Arc::new(orchestrator),
            approvals,
            ledger,
            executions,
            broadcaster,
            metrics,
            rate_limiter: Arc::new(FixedWindowRateLimiter::per_minute(settings.rate_limit_per_minute)),
        }
    }
}
