//! End-to-end plan scenarios against the mock cluster.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use keel_events::PlanEventKind;
use keel_operator::actions::{default_registry, PHASE_PARAM, RESIGN_JOB_KEY};
use keel_operator::cluster::MockCluster;
use keel_plan::{
    ActionRecord, ActionType, ConditionType, Deployment, DeploymentSpec, DeploymentStatus,
    MemberPhase, MemberStatus, Plan, ServerGroup, MEMBER_ID_PREVIOUS_ACTION,
};
use keel_reconcile::{
    ActionContext, JobStatus, MemoryStatusStore, PlanExecutor, Progress, RecordingEventSink,
    StatusStore, TickOutcome, SCRATCH_EMPTY,
};
use rstest::rstest;

struct Env {
    store: Arc<MemoryStatusStore>,
    cluster: Arc<MockCluster>,
    sink: Arc<RecordingEventSink>,
    executor: PlanExecutor,
}

impl Env {
    async fn new(members: Vec<MemberStatus>, plan: Vec<ActionRecord>) -> Self {
        let mut deployment = Deployment::new("db");
        deployment.status.members = members;
        deployment.status.plan = Plan::from(plan);

        let store = Arc::new(MemoryStatusStore::new());
        store.insert(deployment).await.unwrap();
        let cluster = Arc::new(MockCluster::new());
        let sink = Arc::new(RecordingEventSink::new());
        let executor = PlanExecutor::new(
            Arc::new(default_registry().unwrap()),
            store.clone(),
            cluster.clone(),
        )
        .with_sink(sink.clone());

        Self {
            store,
            cluster,
            sink,
            executor,
        }
    }

    async fn tick(&self) -> TickOutcome {
        self.executor.tick("db").await.unwrap().outcome
    }

    async fn status(&self) -> DeploymentStatus {
        self.store.get("db").await.unwrap().value.status
    }

    async fn modify(&self, f: impl FnOnce(&mut DeploymentStatus)) {
        self.store.modify("db", |d| f(&mut d.status)).await.unwrap();
    }
}

fn dbserver(id: &str) -> MemberStatus {
    MemberStatus::new(id, ServerGroup::DbServers)
}

fn record(action_type: ActionType, member_id: &str) -> ActionRecord {
    ActionRecord::new(action_type, ServerGroup::DbServers, member_id)
}

#[tokio::test]
async fn test_shard_cleanout_over_three_ticks() {
    let env = Env::new(
        vec![dbserver("PRMR-1")],
        vec![record(ActionType::CleanOutMember, "PRMR-1")],
    )
    .await;

    // Tick 1: job submitted, start time recorded.
    assert!(matches!(env.tick().await, TickOutcome::Committed { .. }));
    let status = env.status().await;
    let head = status.plan.head().unwrap();
    assert!(head.is_started());
    let member = status.member("PRMR-1").unwrap();
    assert_eq!(member.phase, MemberPhase::CleanOut);
    assert_eq!(member.cleanout_job_id.as_deref(), Some("cleanout-1"));

    // Tick 2: job still running.
    assert_eq!(env.tick().await, TickOutcome::Unchanged);
    assert_eq!(env.status().await.plan.len(), 1);

    // Tick 3: cleaned out.
    env.cluster.mark_cleaned_out("PRMR-1");
    env.tick().await;
    let status = env.status().await;
    assert!(status.plan.is_empty());
    assert!(status
        .member("PRMR-1")
        .unwrap()
        .is_condition_true(&ConditionType::CleanedOut));
    assert_eq!(env.sink.of_kind(PlanEventKind::ActionCompleted).len(), 1);
}

#[tokio::test]
async fn test_cleanout_job_failure_aborts_and_reverts_phase() {
    let env = Env::new(
        vec![dbserver("PRMR-1")],
        vec![record(ActionType::CleanOutMember, "PRMR-1")],
    )
    .await;

    env.tick().await;
    env.cluster
        .set_job("cleanout-1", JobStatus::Failed("not enough servers".to_string()));
    env.tick().await;

    let status = env.status().await;
    assert!(status.plan.is_empty());
    let member = status.member("PRMR-1").unwrap();
    assert_eq!(member.phase, MemberPhase::Created);
    assert_eq!(member.cleanout_job_id, None);

    let aborted = env.sink.of_kind(PlanEventKind::ActionAborted);
    assert_eq!(aborted.len(), 1);
    assert_eq!(aborted[0].member_id, "PRMR-1");
    assert_eq!(env.sink.of_kind(PlanEventKind::ActionNotice).len(), 1);

    // Nothing is retried.
    env.tick().await;
    assert_eq!(env.cluster.call_count("clean_out_server"), 1);
}

#[tokio::test]
async fn test_start_is_idempotent_after_lost_start_time() {
    let env = Env::new(
        vec![dbserver("PRMR-1")],
        vec![record(ActionType::CleanOutMember, "PRMR-1")],
    )
    .await;

    env.tick().await;
    // Crash between the side effect and persisting the start time.
    env.modify(|s| {
        if let Some(head) = s.plan.head_mut() {
            head.start_time = None;
        }
    })
    .await;
    env.tick().await;

    assert_eq!(env.cluster.call_count("clean_out_server"), 1);
    let status = env.status().await;
    assert!(status.plan.head().unwrap().is_started());
    assert_eq!(
        status.member("PRMR-1").unwrap().cleanout_job_id.as_deref(),
        Some("cleanout-1")
    );
}

#[rstest]
#[case::within_grace(10, true)]
#[case::after_grace(70, false)]
#[tokio::test]
async fn test_grace_period_wrapped_rotation(#[case] secs_since_start: i64, #[case] swallowed: bool) {
    let registry = default_registry().unwrap();
    let cluster = MockCluster::new();
    cluster.fail_operation("is_server_up");

    let spec = DeploymentSpec::default();
    let mut members = vec![dbserver("PRMR-1")];
    let mut notices = Vec::new();
    let now = Utc::now();
    let mut rotation = record(ActionType::RotateMember, "PRMR-1");
    rotation.start_time = Some(now - ChronoDuration::seconds(secs_since_start));

    let mut action = registry.build_action(&rotation).unwrap();
    let mut ctx = ActionContext::new(
        "db",
        &spec,
        &mut members,
        &mut rotation,
        &cluster,
        &mut notices,
        Duration::from_secs(1),
        now,
    );
    let result = action.check_progress(&mut ctx).await;

    if swallowed {
        assert_eq!(result.unwrap(), Progress::Pending);
    } else {
        assert!(result.is_err());
    }
}

#[tokio::test]
async fn test_rotation_waits_for_member_to_come_back() {
    let env = Env::new(
        vec![dbserver("PRMR-1")],
        vec![record(ActionType::RotateMember, "PRMR-1")],
    )
    .await;
    env.cluster.set_up("PRMR-1", true);

    env.tick().await;
    assert_eq!(
        env.status().await.member("PRMR-1").unwrap().phase,
        MemberPhase::Rotating
    );

    // Down after the shutdown request.
    env.tick().await;
    assert_eq!(env.status().await.plan.len(), 1);

    env.cluster.set_up("PRMR-1", true);
    env.tick().await;
    let status = env.status().await;
    assert!(status.plan.is_empty());
    assert_eq!(status.member("PRMR-1").unwrap().phase, MemberPhase::Created);
}

#[tokio::test]
async fn test_resign_skipped_in_maintenance() {
    let env = Env::new(
        vec![dbserver("PRMR-1")],
        vec![record(ActionType::ResignLeadership, "PRMR-1")],
    )
    .await;
    env.cluster.set_maintenance(true);

    env.tick().await;
    assert!(env.status().await.plan.is_empty());
    assert_eq!(env.cluster.call_count("resign_leadership"), 0);
    assert_eq!(env.sink.of_kind(PlanEventKind::ActionNotice).len(), 1);
}

#[tokio::test]
async fn test_resign_resubmits_after_failed_job() {
    let env = Env::new(
        vec![dbserver("PRMR-1")],
        vec![record(ActionType::ResignLeadership, "PRMR-1")],
    )
    .await;
    env.cluster.set_leader("PRMR-1", true);

    env.tick().await;
    let locals = env.status().await.plan.head().unwrap().locals.clone();
    assert_eq!(locals.get(RESIGN_JOB_KEY).map(String::as_str), Some("resign-1"));

    env.cluster
        .set_job("resign-1", JobStatus::Failed("leader busy".to_string()));
    env.tick().await;
    let locals = env.status().await.plan.head().unwrap().locals.clone();
    assert_eq!(locals.get(RESIGN_JOB_KEY).map(String::as_str), Some(SCRATCH_EMPTY));

    env.tick().await;
    assert_eq!(env.cluster.call_count("resign_leadership"), 2);

    env.cluster.set_job("resign-2", JobStatus::Finished);
    env.tick().await;
    assert!(env.status().await.plan.is_empty());
}

#[tokio::test]
async fn test_mark_then_remove_previous_member() {
    let env = Env::new(
        vec![dbserver("PRMR-1"), dbserver("PRMR-2")],
        vec![
            record(ActionType::MarkToRemoveMember, "PRMR-1").with_reason("scale down"),
            record(ActionType::RemoveMember, MEMBER_ID_PREVIOUS_ACTION),
        ],
    )
    .await;

    env.tick().await;

    let status = env.status().await;
    assert!(status.plan.is_empty());
    assert!(status.member("PRMR-1").is_none());
    assert!(status.member("PRMR-2").is_some());
    assert!(env.cluster.is_removed("PRMR-1"));
}

#[tokio::test]
async fn test_maintenance_toggle_waits_for_observation() {
    let env = Env::new(Vec::new(), vec![record(ActionType::EnableMaintenance, "")]).await;

    env.tick().await;
    assert!(env.cluster.maintenance());
    assert!(env.status().await.plan.head().unwrap().is_started());

    env.tick().await;
    assert!(env.status().await.plan.is_empty());
}

#[tokio::test]
async fn test_wait_for_member_up_can_finish_in_start() {
    let env = Env::new(
        vec![dbserver("PRMR-1")],
        vec![record(ActionType::WaitForMemberUp, "PRMR-1")],
    )
    .await;
    env.cluster.set_up("PRMR-1", true);

    env.tick().await;
    let status = env.status().await;
    assert!(status.plan.is_empty());
    assert!(status
        .member("PRMR-1")
        .unwrap()
        .is_condition_true(&ConditionType::Ready));
    assert!(env.sink.of_kind(PlanEventKind::ActionStarted).is_empty());
}

#[tokio::test]
async fn test_deprecated_records_drain() {
    let env = Env::new(
        vec![dbserver("PRMR-1")],
        vec![
            record(ActionType::SetCondition, ""),
            record(ActionType::SetMemberCondition, "PRMR-1"),
        ],
    )
    .await;

    env.tick().await;
    assert!(env.status().await.plan.is_empty());
    assert!(env.cluster.calls().is_empty());
}

#[tokio::test]
async fn test_high_priority_phase_update_runs_first() {
    let env = Env::new(
        vec![dbserver("PRMR-1")],
        vec![record(ActionType::ShutdownMember, "PRMR-1")],
    )
    .await;
    env.modify(|s| {
        s.high_priority_plan = Plan::from(vec![
            record(ActionType::MemberPhaseUpdate, "PRMR-1").with_param(PHASE_PARAM, "Draining"),
        ]);
    })
    .await;

    env.tick().await;
    let status = env.status().await;
    assert!(status.high_priority_plan.is_empty());
    assert_eq!(status.member("PRMR-1").unwrap().phase, MemberPhase::Draining);
    assert!(status.plan.head().unwrap().is_started());

    let events = env.sink.events();
    assert_eq!(events[0].event_type, PlanEventKind::ActionCompleted);
    assert_eq!(events[0].action_type, Some(ActionType::MemberPhaseUpdate));
}

#[tokio::test]
async fn test_resign_restart_after_timeout_reattaches_to_job() {
    let env = Env::new(
        vec![dbserver("PRMR-1")],
        vec![record(ActionType::ResignLeadership, "PRMR-1")],
    )
    .await;

    env.tick().await;
    assert_eq!(env.cluster.call_count("resign_leadership"), 1);

    // Age the start time past the resign timeout.
    env.modify(|s| {
        if let Some(head) = s.plan.head_mut() {
            head.start_time = Some(Utc::now() - ChronoDuration::seconds(4000));
        }
    })
    .await;
    env.tick().await;
    assert!(!env.status().await.plan.head().unwrap().is_started());
    assert_eq!(env.sink.of_kind(PlanEventKind::ActionTimeoutRetried).len(), 1);

    env.tick().await;
    env.tick().await;

    assert_eq!(env.cluster.call_count("resign_leadership"), 1);
    let status = env.status().await;
    let head = status.plan.head().unwrap();
    assert!(head.is_started());
    assert_eq!(
        head.locals.get(RESIGN_JOB_KEY).map(String::as_str),
        Some("resign-1")
    );

    env.cluster.set_job("resign-1", JobStatus::Finished);
    env.tick().await;
    assert!(env.status().await.plan.is_empty());
}

#[tokio::test]
async fn test_rotation_restart_does_not_repeat_shutdown() {
    let env = Env::new(
        vec![dbserver("PRMR-1")],
        vec![record(ActionType::RotateMember, "PRMR-1")],
    )
    .await;
    env.cluster.set_up("PRMR-1", true);

    env.tick().await;
    env.modify(|s| {
        if let Some(head) = s.plan.head_mut() {
            head.start_time = None;
        }
    })
    .await;
    env.tick().await;

    assert_eq!(env.cluster.call_count("shutdown_server"), 1);
    assert!(env.status().await.plan.head().unwrap().is_started());
}
