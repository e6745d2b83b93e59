//! Objective-run integration tests
//!
//! The coordinator and the specialists are answered by a scripted
//! completion client keyed on prompt template.

mod support;

use ghostpirates_orchestrator::agents::prompts::library::{COORDINATOR_TURN, DELEGATED_TASK};
use ghostpirates_orchestrator::agents::CompletionError;
use ghostpirates_orchestrator::domain::audit::AuditQuery;
use ghostpirates_orchestrator::domain::execution::ExecutionStatus;
use ghostpirates_orchestrator::domain::message::{MessageStatus, MessageType, Priority};
use ghostpirates_orchestrator::domain::team::{AutonomyConfig, EscalationAction, EscalationCondition, EscalationRule};
use ghostpirates_orchestrator::orchestration::{Counter, EngineError};
use std::time::Duration;
use support::{complete, delegate, task_done, Harness, ScriptedCompletion};

#[tokio::test]
async fn test_run_team_delegates_then_completes() {
    let h = Harness::new(ScriptedCompletion::new());
    let lead = h.agent("Lead", "planning").await;
    let writer = h.agent("Writer", "copy").await;
    let analyst = h.agent("Analyst", "data").await;
    let team = h.team(AutonomyConfig::default(), Some(lead.id), &[writer.id, analyst.id]).await;

    h.completion
        .push(
            COORDINATOR_TURN,
            delegate(&[(writer.id, "Draft the announcement"), (analyst.id, "Size the audience")]),
        )
        .push(COORDINATOR_TURN, complete("Launch plan ready"))
        .always(DELEGATED_TASK, task_done("done"));

    let report = h
        .services
        .orchestrator
        .run_team(h.workspace_id, team.id(), "Plan the product launch", Priority::High)
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.summary.as_deref(), Some("Launch plan ready"));
    assert_eq!(report.agents_involved, vec![writer.id, analyst.id]);
    assert_eq!(report.turns, 1);
    assert!(report.error.is_none());

    let execution = h.services.engine.get(h.workspace_id, report.execution_id).await.unwrap();
    assert_eq!(execution.status(), ExecutionStatus::Completed);
    assert_eq!(execution.objective(), Some("Plan the product launch"));

    // kickoff, two tasks, two results, completion notice
    let thread_id = execution.context()["thread_id"].as_str().unwrap().parse().unwrap();
    let thread = h.services.bus.thread(h.workspace_id, thread_id).await.unwrap();
    assert_eq!(thread.len(), 6);
    let tasks: Vec<_> = thread.iter().filter(|m| m.message_type == MessageType::Task).collect();
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|m| m.status == MessageStatus::Delivered));
    let results: Vec<_> = thread.iter().filter(|m| m.message_type == MessageType::Result).collect();
    assert!(results.iter().all(|m| m.parent_message_id.is_some()));

    let delegations = h
        .services
        .ledger
        .query(
            h.workspace_id,
            &AuditQuery {
                execution_id: Some(report.execution_id),
                action_type: Some("task_delegated".to_string()),
                ..AuditQuery::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(delegations.len(), 2);
    assert_eq!(h.services.metrics.get(Counter::Delegation), 2);
}

#[tokio::test]
async fn test_planning_failure_yields_failed_run() {
    let h = Harness::new(ScriptedCompletion::new());
    let lead = h.agent("Lead", "planning").await;
    let writer = h.agent("Writer", "copy").await;
    let team = h.team(AutonomyConfig::default(), Some(lead.id), &[writer.id]).await;
    h.completion
        .push(COORDINATOR_TURN, Err(CompletionError::Connection("reset by peer".to_string())));

    let report = h
        .services
        .orchestrator
        .run_team(h.workspace_id, team.id(), "Plan the launch", Priority::Normal)
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert!(report.error.as_deref().unwrap().starts_with("Planning failed"));
    assert!(report.summary.is_none());
    assert!(report.agents_involved.is_empty());
    assert_eq!(h.services.metrics.get(Counter::PlanningFailure), 1);
}

#[tokio::test]
async fn test_failed_delegation_keeps_partial_involvement() {
    let h = Harness::new(ScriptedCompletion::new());
    let lead = h.agent("Lead", "planning").await;
    let writer = h.agent("Writer", "copy").await;
    let team = h.team(AutonomyConfig::default(), Some(lead.id), &[writer.id]).await;
    h.completion
        .push(COORDINATOR_TURN, delegate(&[(writer.id, "Draft the announcement")]))
        .push(
            COORDINATOR_TURN,
            Err(CompletionError::Upstream {
                status: 503,
                message: "overloaded".to_string(),
            }),
        )
        .push(
            DELEGATED_TASK,
            Err(CompletionError::Upstream {
                status: 500,
                message: "internal".to_string(),
            }),
        );

    let report = h
        .services
        .orchestrator
        .run_team(h.workspace_id, team.id(), "Plan the launch", Priority::Normal)
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Failed);
    assert_eq!(report.agents_involved, vec![writer.id]);
    assert!(report.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_delegation_respects_concurrency_ceiling() {
    let h = Harness::new(ScriptedCompletion::new().with_delay(Duration::from_millis(50)));
    let lead = h.agent("Lead", "planning").await;
    let mut specialists = Vec::new();
    for name in ["One", "Two", "Three", "Four"] {
        specialists.push(h.agent(name, "general").await.id);
    }
    let autonomy = AutonomyConfig {
        max_concurrent_tasks: 2,
        ..AutonomyConfig::default()
    };
    let team = h.team(autonomy, Some(lead.id), &specialists).await;

    let assignments: Vec<_> = specialists.iter().map(|id| (*id, "Pitch in")).collect();
    h.completion
        .push(COORDINATOR_TURN, delegate(&assignments))
        .push(COORDINATOR_TURN, complete("All hands done"))
        .always(DELEGATED_TASK, task_done("ok"));

    let report = h
        .services
        .orchestrator
        .run_team(h.workspace_id, team.id(), "Everyone helps", Priority::Normal)
        .await
        .unwrap();

    assert_eq!(report.status, ExecutionStatus::Completed);
    assert_eq!(report.agents_involved.len(), 4);
    assert_eq!(h.completion.calls(DELEGATED_TASK), 4);
    assert_eq!(h.completion.peak_concurrency(), 2);
}

#[tokio::test]
async fn test_escalation_pauses_run_and_resume_continues_it() {
    let h = Harness::new(ScriptedCompletion::new());
    let lead = h.agent("Lead", "planning").await;
    let writer = h.agent("Writer", "copy").await;
    let autonomy = AutonomyConfig {
        escalation_rules: vec![EscalationRule {
            condition: EscalationCondition::TaskFailed,
            action: EscalationAction::Pause,
        }],
        ..AutonomyConfig::default()
    };
    let team = h.team(autonomy, Some(lead.id), &[writer.id]).await;
    h.completion
        .push(COORDINATOR_TURN, delegate(&[(writer.id, "Draft the announcement")]))
        .push(DELEGATED_TASK, Err(CompletionError::Unauthorized("expired".to_string())));

    let paused = h
        .services
        .orchestrator
        .run_team(h.workspace_id, team.id(), "Plan the launch", Priority::Normal)
        .await
        .unwrap();

    assert_eq!(paused.status, ExecutionStatus::Paused);
    assert_eq!(paused.turns, 1);
    assert_eq!(h.completion.calls(COORDINATOR_TURN), 1);

    h.completion
        .push(COORDINATOR_TURN, delegate(&[(writer.id, "Try the draft again")]))
        .push(DELEGATED_TASK, Err(CompletionError::Unauthorized("still expired".to_string())))
        .push(COORDINATOR_TURN, complete("Shipped with a manual draft"));

    let resumed = h
        .services
        .orchestrator
        .resume_run(h.workspace_id, paused.execution_id, h.user_id)
        .await
        .unwrap();

    // The rule already fired once and does not pause the run again
    assert_eq!(resumed.status, ExecutionStatus::Completed);
    assert_eq!(resumed.turns, 2);
    assert_eq!(resumed.agents_involved, vec![writer.id]);
    assert_eq!(resumed.summary.as_deref(), Some("Shipped with a manual draft"));
}

#[tokio::test]
async fn test_resume_run_requires_paused_run() {
    let h = Harness::new(ScriptedCompletion::new());
    let lead = h.agent("Lead", "planning").await;
    let writer = h.agent("Writer", "copy").await;
    let team = h.team(AutonomyConfig::default(), Some(lead.id), &[writer.id]).await;
    h.completion.push(COORDINATOR_TURN, complete("Nothing to do"));

    let report = h
        .services
        .orchestrator
        .run_team(h.workspace_id, team.id(), "Idle", Priority::Low)
        .await
        .unwrap();
    let err = h
        .services
        .orchestrator
        .resume_run(h.workspace_id, report.execution_id, h.user_id)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::InvalidTransition {
            from: ExecutionStatus::Completed,
            ..
        }
    ));
}

#[tokio::test]
async fn test_run_team_validates_inputs() {
    let h = Harness::new(ScriptedCompletion::new());
    let lead = h.agent("Lead", "planning").await;
    let writer = h.agent("Writer", "copy").await;
    let staffed = h.team(AutonomyConfig::default(), Some(lead.id), &[writer.id]).await;
    let leaderless = h.team(AutonomyConfig::default(), None, &[writer.id]).await;
    let orchestrator = &h.services.orchestrator;

    let err = orchestrator
        .run_team(h.workspace_id, staffed.id(), "   ", Priority::Normal)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = orchestrator
        .run_team(h.workspace_id, leaderless.id(), "Plan", Priority::Normal)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = orchestrator
        .run_team(h.workspace_id, uuid::Uuid::new_v4(), "Plan", Priority::Normal)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound { entity: "Team", .. }));

    assert_eq!(h.completion.requests().len(), 0);
}
