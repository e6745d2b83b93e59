//! Integration tests for the PostgreSQL repositories
//!
//! These tests verify that the Postgres implementations honour the same
//! contracts as the in-memory stores: round trips, workspace isolation,
//! conditional execution writes and single-resolution approvals.
//!
//! They need a database: run with `DATABASE_URL=... cargo test -- --ignored`.

use ghostpirates_orchestrator::domain::agent::Agent;
use ghostpirates_orchestrator::domain::approval::{ApprovalDecision, ApprovalRequest, ApprovalStatus};
use ghostpirates_orchestrator::domain::audit::{AuditLogEntry, AuditQuery};
use ghostpirates_orchestrator::domain::execution::{ExecutionStatus, WorkflowExecution};
use ghostpirates_orchestrator::domain::message::{
    Message, MessageContent, MessageFilter, MessageStatus, MessageType, NewMessage, Recipient,
};
use ghostpirates_orchestrator::domain::team::{AutonomyConfig, MemberRole, Team};
use ghostpirates_orchestrator::domain::workflow::{Step, StepAction, StepInputs, Workflow};
use ghostpirates_orchestrator::infrastructure::Repositories;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

/// Set up test database connection pool with the schema applied
async fn setup_test_db() -> Repositories {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    Repositories::postgres(pool)
}

async fn create_agent(repos: &Repositories, workspace_id: Uuid, name: &str) -> Agent {
    let mut agent = Agent::new(workspace_id, name.to_string(), "research".to_string()).unwrap();
    agent.activate().unwrap();
    repos.agents.save(&agent).await.expect("Failed to save agent");
    agent
}

async fn create_workflow(repos: &Repositories, workspace_id: Uuid, agent_id: Uuid) -> Workflow {
    let workflow = Workflow::new(
        workspace_id,
        None,
        "Research sweep".to_string(),
        vec![
            Step::new("gather", agent_id, StepAction::Research, StepInputs::new("Gather sources")).on_success("sum"),
            Step::new("sum", agent_id, StepAction::Summarize, StepInputs::new("Summarize")),
        ],
        Uuid::new_v4(),
    )
    .unwrap();
    repos.workflows.save(&workflow).await.expect("Failed to save workflow");
    workflow
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_agent_repository_round_trip_and_isolation() {
    let repos = setup_test_db().await;
    let workspace_id = Uuid::new_v4();
    let other_workspace = Uuid::new_v4();

    let agent = create_agent(&repos, workspace_id, "Scout").await;

    let found = repos.agents.find_by_id(workspace_id, agent.id).await.unwrap();
    assert_eq!(found.map(|a| a.name), Some("Scout".to_string()));

    let hidden = repos.agents.find_by_id(other_workspace, agent.id).await.unwrap();
    assert!(hidden.is_none(), "agents must not leak across workspaces");

    let many = repos
        .agents
        .find_many(workspace_id, &[agent.id, Uuid::new_v4()])
        .await
        .unwrap();
    assert_eq!(many.len(), 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_team_repository_save_update_and_delete() {
    let repos = setup_test_db().await;
    let workspace_id = Uuid::new_v4();
    let lead = create_agent(&repos, workspace_id, "Lead").await;
    let writer = create_agent(&repos, workspace_id, "Writer").await;

    let (mut team, _) = Team::new(
        workspace_id,
        "Launch Crew".to_string(),
        "Marketing".to_string(),
        Uuid::new_v4(),
        AutonomyConfig::default(),
    )
    .unwrap();
    team.add_member(lead.id, MemberRole::Coordinator, 100).unwrap();
    repos.teams.save(&team).await.expect("Failed to save team");

    team.add_member(writer.id, MemberRole::Specialist, 10).unwrap();
    repos.teams.save(&team).await.expect("Failed to upsert team");

    let found = repos.teams.find_by_id(workspace_id, team.id()).await.unwrap().unwrap();
    assert_eq!(found.coordinator_id(), Some(lead.id));
    assert_eq!(found.members().len(), 2);
    assert_eq!(found.autonomy(), team.autonomy());

    assert!(repos.teams.delete(workspace_id, team.id()).await.unwrap());
    assert!(!repos.teams.delete(workspace_id, team.id()).await.unwrap());
    assert!(repos.agents.find_by_id(workspace_id, writer.id).await.unwrap().is_some());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_workflow_repository_keeps_steps_and_versions() {
    let repos = setup_test_db().await;
    let workspace_id = Uuid::new_v4();
    let agent = create_agent(&repos, workspace_id, "Scout").await;
    let workflow = create_workflow(&repos, workspace_id, agent.id).await;

    let revised = workflow
        .revise(None, workflow.steps[..1].to_vec(), Uuid::new_v4())
        .unwrap();
    repos.workflows.save(&revised).await.unwrap();

    let found = repos.workflows.find_by_id(workspace_id, workflow.id).await.unwrap().unwrap();
    assert_eq!(found.steps, workflow.steps);

    let next = repos.workflows.find_by_id(workspace_id, revised.id).await.unwrap().unwrap();
    assert_eq!(next.version, 2);
    assert_eq!(next.previous_version_id, Some(workflow.id));
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_execution_compare_and_set_rejects_stale_writers() {
    let repos = setup_test_db().await;
    let workspace_id = Uuid::new_v4();
    let agent = create_agent(&repos, workspace_id, "Scout").await;
    let workflow = create_workflow(&repos, workspace_id, agent.id).await;

    let execution = WorkflowExecution::for_workflow(&workflow);
    repos.executions.insert(&execution).await.unwrap();

    let mut first = execution.clone();
    first.transition_to(ExecutionStatus::Running).unwrap();
    let mut second = execution.clone();
    second.transition_to(ExecutionStatus::Cancelled).unwrap();

    assert!(repos
        .executions
        .compare_and_set(&first, ExecutionStatus::Pending)
        .await
        .unwrap());
    assert!(
        !repos
            .executions
            .compare_and_set(&second, ExecutionStatus::Pending)
            .await
            .unwrap(),
        "second writer read a stale revision"
    );

    let stored = repos
        .executions
        .find_by_id(workspace_id, execution.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status(), ExecutionStatus::Running);
    assert_eq!(stored.revision(), execution.revision() + 1);
    assert_eq!(repos.executions.count_by_workflow(workspace_id, workflow.id).await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_message_thread_order_and_status() {
    let repos = setup_test_db().await;
    let workspace_id = Uuid::new_v4();
    let lead = create_agent(&repos, workspace_id, "Lead").await;
    let writer = create_agent(&repos, workspace_id, "Writer").await;

    let thread_id = Uuid::new_v4();
    let task = Message::create(
        workspace_id,
        NewMessage::new(
            Recipient::Agent(writer.id),
            MessageType::Task,
            MessageContent::new("Draft", "Write the launch post"),
        )
        .from_agent(lead.id)
        .awaiting_pickup(),
        thread_id,
    )
    .unwrap();
    repos.messages.insert(&task).await.unwrap();

    let reply = Message::create(
        workspace_id,
        NewMessage::new(
            Recipient::Agent(lead.id),
            MessageType::Result,
            MessageContent::new("Draft", "Attached").with_data(json!({ "words": 420 })),
        )
        .from_agent(writer.id)
        .replying_to(task.id),
        thread_id,
    )
    .unwrap();
    repos.messages.insert(&reply).await.unwrap();

    let thread = repos.messages.find_thread(workspace_id, thread_id).await.unwrap();
    let ids: Vec<Uuid> = thread.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![task.id, reply.id]);
    assert_eq!(thread[1].content.data, Some(json!({ "words": 420 })));

    let inbox = repos
        .messages
        .list(
            workspace_id,
            &MessageFilter {
                agent_id: Some(writer.id),
                message_type: Some(MessageType::Task),
                ..MessageFilter::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(inbox.len(), 1);

    assert!(repos
        .messages
        .update_status(workspace_id, task.id, MessageStatus::Pending, MessageStatus::Delivered)
        .await
        .unwrap());
    assert!(!repos
        .messages
        .update_status(workspace_id, task.id, MessageStatus::Pending, MessageStatus::Delivered)
        .await
        .unwrap());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_approval_resolves_once() {
    let repos = setup_test_db().await;
    let workspace_id = Uuid::new_v4();
    let agent = create_agent(&repos, workspace_id, "Scout").await;
    let workflow = create_workflow(&repos, workspace_id, agent.id).await;
    let execution = WorkflowExecution::for_workflow(&workflow);
    repos.executions.insert(&execution).await.unwrap();

    let request = ApprovalRequest::new(
        workspace_id,
        execution.id(),
        "gather".to_string(),
        StepAction::Research,
        Uuid::new_v4(),
    );
    repos.approvals.insert(&request).await.unwrap();

    let mut approved = request.clone();
    approved
        .resolve(ApprovalDecision::Approve, Uuid::new_v4(), Some("ok".to_string()), None)
        .unwrap();
    let mut rejected = request.clone();
    rejected
        .resolve(ApprovalDecision::Reject, Uuid::new_v4(), None, None)
        .unwrap();

    assert!(repos.approvals.resolve(&approved).await.unwrap());
    assert!(!repos.approvals.resolve(&rejected).await.unwrap());

    let stored = repos.approvals.find_by_id(workspace_id, request.id).await.unwrap().unwrap();
    assert_eq!(stored.status, ApprovalStatus::Approved);
    assert!(repos.approvals.find_pending(workspace_id).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_audit_log_query_filters() {
    let repos = setup_test_db().await;
    let workspace_id = Uuid::new_v4();
    let execution_id = Uuid::new_v4();

    repos
        .audit
        .append(&AuditLogEntry::automatic(workspace_id, "step_completed").execution(execution_id))
        .await
        .unwrap();
    repos
        .audit
        .append(
            &AuditLogEntry::human(workspace_id, "approval_rejected")
                .execution(execution_id)
                .success(false),
        )
        .await
        .unwrap();

    let human = repos
        .audit
        .query(
            workspace_id,
            &AuditQuery {
                execution_id: Some(execution_id),
                was_automatic: Some(false),
                ..AuditQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(human.len(), 1);
    assert_eq!(human[0].action_type, "approval_rejected");

    let elsewhere = repos.audit.query(Uuid::new_v4(), &AuditQuery::default()).await.unwrap();
    assert!(elsewhere.is_empty());
}
