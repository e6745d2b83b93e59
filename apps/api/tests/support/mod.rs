//! Shared fixtures for the orchestration integration tests
//!
//! Everything runs over the in-memory repositories with a scripted
//! completion client standing in for the model.

#![allow(dead_code)]

use async_trait::async_trait;
use ghostpirates_orchestrator::agents::{CompletionClient, CompletionError, CompletionRequest, CompletionResponse};
use ghostpirates_orchestrator::domain::agent::Agent;
use ghostpirates_orchestrator::domain::team::{AutonomyConfig, MemberRole, Team};
use ghostpirates_orchestrator::domain::workflow::{Step, Workflow};
use ghostpirates_orchestrator::infrastructure::Repositories;
use ghostpirates_orchestrator::orchestration::{EngineSettings, OrchestrationServices};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub type Reply = Result<String, CompletionError>;

/// Completion client that answers from per-template scripts
///
/// Scripted replies are consumed in order; once a template's script is
/// exhausted its fallback (if any) answers every further call.
#[derive(Default)]
pub struct ScriptedCompletion {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    fallbacks: Mutex<HashMap<String, Reply>>,
    requests: Mutex<Vec<CompletionRequest>>,
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call takes this long (on tokio's clock)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn push(&self, template: &str, reply: Reply) -> &Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(template.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn always(&self, template: &str, reply: Reply) -> &Self {
        self.fallbacks.lock().unwrap().insert(template.to_string(), reply);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self, template: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.template == template)
            .count()
    }

    /// Highest number of calls that were in flight at once
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_reply(&self, template: &str) -> Reply {
        if let Some(reply) = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(template)
            .and_then(VecDeque::pop_front)
        {
            return reply;
        }
        self.fallbacks
            .lock()
            .unwrap()
            .get(template)
            .cloned()
            .unwrap_or_else(|| Err(CompletionError::InvalidRequest(format!("no script for {}", template))))
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, CompletionError> {
        let template = request.template.clone();
        self.requests.lock().unwrap().push(request);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let reply = self.next_reply(&template);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        reply.map(CompletionResponse::text)
    }
}

pub struct Harness {
    pub services: OrchestrationServices,
    pub completion: Arc<ScriptedCompletion>,
    pub workspace_id: Uuid,
    pub user_id: Uuid,
}

impl Harness {
    pub fn new(completion: ScriptedCompletion) -> Self {
        Self::with_repos(Repositories::in_memory(), completion, EngineSettings::default())
    }

    pub fn with_repos(repos: Repositories, completion: ScriptedCompletion, settings: EngineSettings) -> Self {
        let completion = Arc::new(completion);
        let services = OrchestrationServices::build(repos, completion.clone(), settings);
        Self {
            services,
            completion,
            workspace_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
        }
    }

    /// Saves an active agent
    pub async fn agent(&self, name: &str, capability: &str) -> Agent {
        let mut agent = Agent::new(self.workspace_id, name.to_string(), capability.to_string()).unwrap();
        agent.activate().unwrap();
        self.services.repos.agents.save(&agent).await.unwrap();
        agent
    }

    pub async fn team(&self, autonomy: AutonomyConfig, coordinator: Option<Uuid>, specialists: &[Uuid]) -> Team {
        let (mut team, _) = Team::new(
            self.workspace_id,
            "Launch Crew".to_string(),
            "Marketing".to_string(),
            self.user_id,
            autonomy,
        )
        .unwrap();
        if let Some(coordinator) = coordinator {
            team.add_member(coordinator, MemberRole::Coordinator, 100).unwrap();
        }
        for (rank, agent_id) in specialists.iter().enumerate() {
            team.add_member(*agent_id, MemberRole::Specialist, 50 - rank as i32).unwrap();
        }
        self.services.repos.teams.save(&team).await.unwrap();
        team
    }

    pub async fn workflow(&self, team_id: Option<Uuid>, steps: Vec<Step>) -> Workflow {
        let workflow = Workflow::new(self.workspace_id, team_id, "Campaign".to_string(), steps, self.user_id).unwrap();
        self.services.repos.workflows.save(&workflow).await.unwrap();
        workflow
    }
}

/// A coordinator reply delegating one task per agent
pub fn delegate(assignments: &[(Uuid, &str)]) -> Reply {
    let assignments: Vec<_> = assignments
        .iter()
        .map(|(agent_id, task)| serde_json::json!({ "agent_id": agent_id, "task": task }))
        .collect();
    Ok(serde_json::json!({
        "action": "delegate",
        "assignments": assignments,
        "rationale": "split the work"
    })
    .to_string())
}

pub fn complete(summary: &str) -> Reply {
    Ok(serde_json::json!({ "action": "complete", "summary": summary }).to_string())
}

pub fn task_done(summary: &str) -> Reply {
    Ok(serde_json::json!({ "summary": summary, "result": { "ok": true } }).to_string())
}
