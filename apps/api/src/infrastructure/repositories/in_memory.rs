use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use crate::domain::agent::Agent;
use crate::domain::approval::{ApprovalRequest, ApprovalStatus};
use crate::domain::audit::{AuditLogEntry, AuditQuery};
use crate::domain::execution::{ExecutionStatus, WorkflowExecution};
use crate::domain::message::{Message, MessageFilter, MessageStatus};
use crate::domain::repositories::{
    AgentRepository, ApprovalRepository, AuditRepository, ExecutionRepository, MessageRepository, RepoResult,
    RepositoryError, TeamRepository, WorkflowRepository,
};
use crate::domain::team::Team;
use crate::domain::workflow::Workflow;

/// Workspace-keyed table guarded by a std `RwLock`
///
/// Locks are only held for the duration of a map operation, never across
/// an await point.
struct Table<T> {
    rows: RwLock<HashMap<Uuid, T>>,
}

impl<T: Clone> Table<T> {
    fn new() -> Self {
        Self {
            rows: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, HashMap<Uuid, T>>> {
        self.rows
            .read()
            .map_err(|_| RepositoryError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, HashMap<Uuid, T>>> {
        self.rows
            .write()
            .map_err(|_| RepositoryError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn select(&self, predicate: impl Fn(&T) -> bool) -> RepoResult<Vec<T>> {
        Ok(self.read()?.values().filter(|row| predicate(row)).cloned().collect())
    }
}

fn paginate<T>(rows: Vec<T>, offset: u32, limit: u32) -> Vec<T> {
    rows.into_iter().skip(offset as usize).take(limit as usize).collect()
}

pub struct InMemoryAgentRepository {
    agents: Table<Agent>,
}

impl InMemoryAgentRepository {
    pub fn new() -> Self {
        Self { agents: Table::new() }
    }
}

impl Default for InMemoryAgentRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRepository for InMemoryAgentRepository {
    async fn save(&self, agent: &Agent) -> RepoResult<()> {
        self.agents.write()?.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<Agent>> {
        Ok(self
            .agents
            .read()?
            .get(&id)
            .filter(|a| a.workspace_id == workspace_id)
            .cloned())
    }

    async fn find_by_workspace(&self, workspace_id: Uuid) -> RepoResult<Vec<Agent>> {
        let mut agents = self.agents.select(|a| a.workspace_id == workspace_id)?;
        agents.sort_by_key(|a| a.created_at);
        Ok(agents)
    }

    async fn find_many(&self, workspace_id: Uuid, ids: &[Uuid]) -> RepoResult<Vec<Agent>> {
        let agents = self.agents.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| agents.get(id))
            .filter(|a| a.workspace_id == workspace_id)
            .cloned()
            .collect())
    }
}

pub struct InMemoryTeamRepository {
    teams: Table<Team>,
}

impl InMemoryTeamRepository {
    pub fn new() -> Self {
        Self { teams: Table::new() }
    }
}

impl Default for InMemoryTeamRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TeamRepository for InMemoryTeamRepository {
    async fn save(&self, team: &Team) -> RepoResult<()> {
        self.teams.write()?.insert(team.id(), team.clone());
        Ok(())
    }

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<Team>> {
        Ok(self
            .teams
            .read()?
            .get(&id)
            .filter(|t| t.workspace_id() == workspace_id)
            .cloned())
    }

    async fn find_by_workspace(&self, workspace_id: Uuid) -> RepoResult<Vec<Team>> {
        let mut teams = self.teams.select(|t| t.workspace_id() == workspace_id)?;
        teams.sort_by_key(|t| std::cmp::Reverse(t.created_at()));
        Ok(teams)
    }

    async fn delete(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<bool> {
        let mut teams = self.teams.write()?;
        match teams.get(&id) {
            Some(team) if team.workspace_id() == workspace_id => {
                teams.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

pub struct InMemoryWorkflowRepository {
    workflows: Table<Workflow>,
}

impl InMemoryWorkflowRepository {
    pub fn new() -> Self {
        Self {
            workflows: Table::new(),
        }
    }
}

impl Default for InMemoryWorkflowRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn save(&self, workflow: &Workflow) -> RepoResult<()> {
        self.workflows.write()?.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<Workflow>> {
        Ok(self
            .workflows
            .read()?
            .get(&id)
            .filter(|w| w.workspace_id == workspace_id)
            .cloned())
    }

    async fn find_by_workspace(&self, workspace_id: Uuid) -> RepoResult<Vec<Workflow>> {
        let mut workflows = self.workflows.select(|w| w.workspace_id == workspace_id)?;
        workflows.sort_by_key(|w| std::cmp::Reverse(w.created_at));
        Ok(workflows)
    }
}

pub struct InMemoryExecutionRepository {
    executions: Table<WorkflowExecution>,
}

impl InMemoryExecutionRepository {
    pub fn new() -> Self {
        Self {
            executions: Table::new(),
        }
    }
}

impl Default for InMemoryExecutionRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn insert(&self, execution: &WorkflowExecution) -> RepoResult<()> {
        let mut executions = self.executions.write()?;
        if executions.contains_key(&execution.id()) {
            return Err(RepositoryError::Query(format!(
                "Execution {} already exists",
                execution.id()
            )));
        }
        executions.insert(execution.id(), execution.clone());
        Ok(())
    }

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<WorkflowExecution>> {
        Ok(self
            .executions
            .read()?
            .get(&id)
            .filter(|e| e.workspace_id() == workspace_id)
            .cloned())
    }

    async fn compare_and_set(
        &self,
        execution: &WorkflowExecution,
        expected_status: ExecutionStatus,
    ) -> RepoResult<bool> {
        let mut executions = self.executions.write()?;
        let Some(stored) = executions.get_mut(&execution.id()) else {
            return Ok(false);
        };
        if stored.status() != expected_status || stored.revision() != execution.revision() {
            return Ok(false);
        }

        let mut next = execution.clone();
        next.mark_persisted();
        *stored = next;
        Ok(true)
    }

    async fn count_by_workflow(&self, workspace_id: Uuid, workflow_id: Uuid) -> RepoResult<u64> {
        Ok(self
            .executions
            .read()?
            .values()
            .filter(|e| e.workspace_id() == workspace_id && e.workflow_id() == Some(workflow_id))
            .count() as u64)
    }

    async fn find_by_workspace(
        &self,
        workspace_id: Uuid,
        status: Option<ExecutionStatus>,
    ) -> RepoResult<Vec<WorkflowExecution>> {
        let mut executions = self
            .executions
            .select(|e| e.workspace_id() == workspace_id && status.map_or(true, |s| e.status() == s))?;
        executions.sort_by_key(|e| std::cmp::Reverse(e.created_at()));
        Ok(executions)
    }
}

/// Messages kept in insertion order so equal timestamps stay stable
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<Message>>,
}

impl InMemoryMessageRepository {
    pub fn new() -> Self {
        Self {
            messages: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> RepoResult<RwLockReadGuard<'_, Vec<Message>>> {
        self.messages
            .read()
            .map_err(|_| RepositoryError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> RepoResult<RwLockWriteGuard<'_, Vec<Message>>> {
        self.messages
            .write()
            .map_err(|_| RepositoryError::Unavailable("in-memory store lock poisoned".to_string()))
    }
}

impl Default for InMemoryMessageRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: &Message) -> RepoResult<()> {
        self.write()?.push(message.clone());
        Ok(())
    }

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<Message>> {
        Ok(self
            .read()?
            .iter()
            .find(|m| m.id == id && m.workspace_id == workspace_id)
            .cloned())
    }

    async fn list(&self, workspace_id: Uuid, filter: &MessageFilter) -> RepoResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .read()?
            .iter()
            .rev()
            .filter(|m| m.workspace_id == workspace_id && filter.matches(m))
            .cloned()
            .collect();
        messages.sort_by_key(|m| std::cmp::Reverse(m.created_at));
        Ok(paginate(messages, filter.offset(), filter.limit()))
    }

    async fn find_thread(&self, workspace_id: Uuid, thread_id: Uuid) -> RepoResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .read()?
            .iter()
            .filter(|m| m.workspace_id == workspace_id && m.thread_id == thread_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        Ok(messages)
    }

    async fn update_status(
        &self,
        workspace_id: Uuid,
        id: Uuid,
        from: MessageStatus,
        to: MessageStatus,
    ) -> RepoResult<bool> {
        let mut messages = self.write()?;
        match messages
            .iter_mut()
            .find(|m| m.id == id && m.workspace_id == workspace_id && m.status == from)
        {
            Some(message) => {
                message.status = to;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

pub struct InMemoryApprovalRepository {
    approvals: Table<ApprovalRequest>,
}

impl InMemoryApprovalRepository {
    pub fn new() -> Self {
        Self {
            approvals: Table::new(),
        }
    }
}

impl Default for InMemoryApprovalRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalRepository for InMemoryApprovalRepository {
    async fn insert(&self, request: &ApprovalRequest) -> RepoResult<()> {
        self.approvals.write()?.insert(request.id, request.clone());
        Ok(())
    }

    async fn find_by_id(&self, workspace_id: Uuid, id: Uuid) -> RepoResult<Option<ApprovalRequest>> {
        Ok(self
            .approvals
            .read()?
            .get(&id)
            .filter(|r| r.workspace_id == workspace_id)
            .cloned())
    }

    async fn find_latest_for_step(
        &self,
        workspace_id: Uuid,
        execution_id: Uuid,
        step_id: &str,
    ) -> RepoResult<Option<ApprovalRequest>> {
        Ok(self
            .approvals
            .select(|r| r.workspace_id == workspace_id && r.execution_id == execution_id && r.step_id == step_id)?
            .into_iter()
            .max_by_key(|r| r.created_at))
    }

    async fn resolve(&self, request: &ApprovalRequest) -> RepoResult<bool> {
        let mut approvals = self.approvals.write()?;
        match approvals.get_mut(&request.id) {
            Some(stored) if stored.status == ApprovalStatus::Pending => {
                *stored = request.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_pending(&self, workspace_id: Uuid) -> RepoResult<Vec<ApprovalRequest>> {
        let mut pending = self
            .approvals
            .select(|r| r.workspace_id == workspace_id && r.status == ApprovalStatus::Pending)?;
        pending.sort_by_key(|r| r.created_at);
        Ok(pending)
    }

    async fn find_by_execution(&self, workspace_id: Uuid, execution_id: Uuid) -> RepoResult<Vec<ApprovalRequest>> {
        let mut requests = self
            .approvals
            .select(|r| r.workspace_id == workspace_id && r.execution_id == execution_id)?;
        requests.sort_by_key(|r| r.created_at);
        Ok(requests)
    }
}

pub struct InMemoryAuditRepository {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditRepository {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryAuditRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditRepository for InMemoryAuditRepository {
    async fn append(&self, entry: &AuditLogEntry) -> RepoResult<()> {
        self.entries
            .write()
            .map_err(|_| RepositoryError::Unavailable("in-memory store lock poisoned".to_string()))?
            .push(entry.clone());
        Ok(())
    }

    async fn query(&self, workspace_id: Uuid, query: &AuditQuery) -> RepoResult<Vec<AuditLogEntry>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RepositoryError::Unavailable("in-memory store lock poisoned".to_string()))?;
        let mut matching: Vec<AuditLogEntry> = entries
            .iter()
            .rev()
            .filter(|e| e.workspace_id == workspace_id && query.matches(e))
            .cloned()
            .collect();
        matching.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        Ok(paginate(matching, query.offset(), query.limit()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::{MessageContent, MessageType, NewMessage, Recipient};
    use crate::domain::workflow::{Step, StepAction, StepInputs};

    fn execution() -> WorkflowExecution {
        let steps = vec![Step::new("a", Uuid::new_v4(), StepAction::Analyze, StepInputs::new("go"))];
        let workflow = Workflow::new(Uuid::new_v4(), None, "Flow".to_string(), steps, Uuid::new_v4()).unwrap();
        WorkflowExecution::for_workflow(&workflow)
    }

    #[tokio::test]
    async fn compare_and_set_rejects_stale_writers() {
        let repo = InMemoryExecutionRepository::new();
        let execution = execution();
        repo.insert(&execution).await.unwrap();

        let mut first = execution.clone();
        first.transition_to(ExecutionStatus::Running).unwrap();
        let mut second = execution.clone();
        second.transition_to(ExecutionStatus::Cancelled).unwrap();

        assert!(repo.compare_and_set(&first, ExecutionStatus::Pending).await.unwrap());
        assert!(!repo.compare_and_set(&second, ExecutionStatus::Pending).await.unwrap());

        let stored = repo
            .find_by_id(execution.workspace_id(), execution.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status(), ExecutionStatus::Running);
        assert_eq!(stored.revision(), 1);
    }

    #[tokio::test]
    async fn lookups_are_workspace_scoped() {
        let repo = InMemoryExecutionRepository::new();
        let execution = execution();
        repo.insert(&execution).await.unwrap();

        let other_workspace = repo.find_by_id(Uuid::new_v4(), execution.id()).await.unwrap();
        assert!(other_workspace.is_none());
    }

    #[tokio::test]
    async fn thread_is_ordered_by_creation() {
        let repo = InMemoryMessageRepository::new();
        let workspace = Uuid::new_v4();
        let thread = Uuid::new_v4();
        let team = Uuid::new_v4();

        for subject in ["first", "second", "third"] {
            let new = NewMessage::new(
                Recipient::Team(team),
                MessageType::Context,
                MessageContent::new(subject, "body"),
            );
            repo.insert(&Message::create(workspace, new, thread).unwrap())
                .await
                .unwrap();
        }

        let subjects: Vec<String> = repo
            .find_thread(workspace, thread)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.content.subject)
            .collect();
        assert_eq!(subjects, vec!["first", "second", "third"]);
    }

    #[tokio::test]
    async fn message_status_update_is_conditional() {
        let repo = InMemoryMessageRepository::new();
        let workspace = Uuid::new_v4();
        let new = NewMessage::new(
            Recipient::Agent(Uuid::new_v4()),
            MessageType::Query,
            MessageContent::new("Q", "?"),
        );
        let message = Message::create(workspace, new, Uuid::new_v4()).unwrap();
        repo.insert(&message).await.unwrap();

        assert!(repo
            .update_status(workspace, message.id, MessageStatus::Delivered, MessageStatus::Read)
            .await
            .unwrap());
        assert!(!repo
            .update_status(workspace, message.id, MessageStatus::Delivered, MessageStatus::Read)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn approval_resolves_only_once() {
        let repo = InMemoryApprovalRepository::new();
        let mut request = ApprovalRequest::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "send".to_string(),
            StepAction::SendEmail,
            Uuid::new_v4(),
        );
        repo.insert(&request).await.unwrap();

        request
            .resolve(crate::domain::approval::ApprovalDecision::Approve, Uuid::new_v4(), None, None)
            .unwrap();
        assert!(repo.resolve(&request).await.unwrap());
        assert!(!repo.resolve(&request).await.unwrap());
    }
}
