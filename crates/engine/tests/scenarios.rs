//! End-to-end automation scenarios against the in-memory store and CRM.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use db::models::{Page, RunStatus};
use db::{CursorStore, MemoryStore};
use engine::{
    AutomationEngine, Collaborators, CreateAutomation, EngineConfig, EngineError, Stores, UpdateAutomation,
    MANUAL_TEST,
};
use nodes::mock::InMemoryCrm;
use nodes::{ActionContext, ActionError, Notification, Notifier, RecordSnapshot, Temperature};
use queue::{event_types, DomainEvent};

fn setup() -> (Arc<MemoryStore>, Arc<InMemoryCrm>, AutomationEngine) {
    let store = Arc::new(MemoryStore::new());
    let crm = Arc::new(InMemoryCrm::new());
    let engine = AutomationEngine::in_memory(Arc::clone(&store), Arc::clone(&crm), EngineConfig::default());
    (store, crm, engine)
}

fn lead(temperature: Temperature) -> RecordSnapshot {
    let mut record = RecordSnapshot::new("lead-1");
    record.status_id = Some("new".into());
    record.temperature = Some(temperature);
    record
}

fn status_changed(tenant: Uuid) -> DomainEvent {
    DomainEvent::new(
        tenant,
        event_types::STATUS_CHANGED,
        "lead-1",
        json!({ "fromStatusId": "new", "toStatusId": "contacted" }),
        "agent-7",
    )
}

async fn create(engine: &AutomationEngine, tenant: Uuid, graph: Value, active: bool) -> Result<Uuid, EngineError> {
    engine
        .service
        .create(
            tenant,
            CreateAutomation {
                name: "scenario".into(),
                description: Some("end-to-end".into()),
                workflow_graph: graph,
                is_active: active,
            },
        )
        .await
        .map(|a| a.id)
}

/// Trigger(status_changed) → Condition[HotUnassigned] → assign U1 → "Make Offer" task.
fn hot_unassigned_graph() -> Value {
    json!({
        "nodes": [
            { "id": "trigger", "kind": "trigger", "subtype": "status_changed", "config": {} },
            { "id": "check", "kind": "condition", "subtype": "if_else", "config": { "branches": [
                { "id": "hot-unassigned", "name": "HotUnassigned", "conditions": [
                    { "field": "temperature", "operator": "equals", "value": "HOT" },
                    { "field": "isAssigned", "operator": "is_empty", "combinator": "AND" }
                ] }
            ] } },
            { "id": "on-hot", "kind": "branch" },
            { "id": "on-none", "kind": "branch" },
            { "id": "assign", "kind": "action", "subtype": "assign_user", "config": { "userId": "U1" } },
            { "id": "offer", "kind": "action", "subtype": "create_task", "config": {
                "title": "Make Offer", "priority": "high", "dueInDays": 1
            } }
        ],
        "edges": [
            { "from": "trigger", "to": "check" },
            { "from": "check", "to": "on-hot", "branchId": "hot-unassigned" },
            { "from": "check", "to": "on-none", "branchId": "none" },
            { "from": "on-hot", "to": "assign" },
            { "from": "assign", "to": "offer" }
        ]
    })
}

// ============================================================
// Scenarios
// ============================================================

#[tokio::test]
async fn hot_unassigned_lead_is_assigned_and_gets_an_offer_task() {
    let (_, crm, engine) = setup();
    let tenant = Uuid::new_v4();
    crm.add_record(lead(Temperature::Hot));
    crm.add_user("U1");
    let id = create(&engine, tenant, hot_unassigned_graph(), true).await.unwrap();

    let runs = engine.dispatcher.dispatch(status_changed(tenant)).await.unwrap();

    assert_eq!(runs.len(), 1);
    let run = engine.service.run(runs[0]).await.unwrap();
    assert!(run.is(RunStatus::Completed));
    assert_eq!(run.triggered_by, "status_changed");
    assert_eq!(run.automation_id, id);

    assert_eq!(crm.record("lead-1").unwrap().assigned_user_id.as_deref(), Some("U1"));
    let tasks = crm.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].title, "Make Offer");
    // Owner is read after the assignment above.
    assert_eq!(tasks[0].assignee_id.as_deref(), Some("U1"));
    assert!(tasks[0].due_at.is_some());
}

#[tokio::test]
async fn warm_lead_takes_the_none_branch_without_side_effects() {
    let (_, crm, engine) = setup();
    let tenant = Uuid::new_v4();
    crm.add_record(lead(Temperature::Warm));
    crm.add_user("U1");
    create(&engine, tenant, hot_unassigned_graph(), true).await.unwrap();

    let runs = engine.dispatcher.dispatch(status_changed(tenant)).await.unwrap();

    let run = engine.service.run(runs[0]).await.unwrap();
    assert!(run.is(RunStatus::Completed));
    assert_eq!(crm.mutation_count(), 0);
    assert!(crm.tasks().is_empty());
}

#[tokio::test]
async fn wait_then_notify_completes_after_the_wait_elapses() {
    let (_, crm, engine) = setup();
    let tenant = Uuid::new_v4();
    crm.add_record(lead(Temperature::Cold));
    crm.add_user("U1");
    create(
        &engine,
        tenant,
        json!({
            "nodes": [
                { "id": "trigger", "kind": "trigger", "subtype": "status_changed", "config": {} },
                { "id": "wait", "kind": "action", "subtype": "wait", "config": { "amount": 1, "unit": "hours" } },
                { "id": "notify", "kind": "action", "subtype": "send_notification",
                  "config": { "userId": "U1", "message": "Follow up with this lead" } }
            ],
            "edges": [
                { "from": "trigger", "to": "wait" },
                { "from": "wait", "to": "notify" }
            ]
        }),
        true,
    )
    .await
    .unwrap();

    let runs = engine.dispatcher.dispatch(status_changed(tenant)).await.unwrap();
    let run = engine.service.run(runs[0]).await.unwrap();
    assert!(run.is(RunStatus::Suspended));
    assert!(run.resume_at.is_some_and(|at| at > Utc::now() + Duration::minutes(59)));
    assert!(crm.notifications().is_empty());

    assert_eq!(engine.scheduler.tick_at(Utc::now() + Duration::minutes(30)).await.unwrap(), 0);
    assert_eq!(engine.scheduler.tick_at(Utc::now() + Duration::minutes(61)).await.unwrap(), 1);

    let run = engine.service.run(runs[0]).await.unwrap();
    assert!(run.is(RunStatus::Completed));
    let sent = crm.notifications();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].user_id, "U1");
    assert_eq!(sent[0].record_id, "lead-1");
}

#[tokio::test]
async fn graph_without_trigger_is_rejected_and_stays_inactive() {
    let (_, _, engine) = setup();
    let tenant = Uuid::new_v4();
    let no_trigger = json!({
        "nodes": [{ "id": "assign", "kind": "action", "subtype": "assign_user", "config": { "userId": "U1" } }],
        "edges": []
    });

    let err = create(&engine, tenant, no_trigger.clone(), true).await.unwrap_err();
    assert!(err.is_validation());
    assert!(matches!(err, EngineError::MissingTrigger));
    assert!(engine.service.list(tenant).await.unwrap().is_empty());

    // Saving the broken graph over a draft while activating it fails too.
    let draft = create(&engine, tenant, hot_unassigned_graph(), false).await.unwrap();
    let err = engine
        .service
        .update(
            draft,
            UpdateAutomation {
                workflow_graph: Some(no_trigger),
                is_active: Some(true),
                ..UpdateAutomation::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::MissingTrigger));

    let stored = engine.service.get(draft).await.unwrap();
    assert!(!stored.is_active);
    assert!(stored.is_draft);
}

// ============================================================
// Branch selection
// ============================================================

#[tokio::test]
async fn first_matching_branch_wins() {
    let (_, crm, engine) = setup();
    let tenant = Uuid::new_v4();
    let mut record = lead(Temperature::Hot);
    record.tag_ids = vec!["vip".into()];
    crm.add_record(record);
    crm.add_tag("picked-hot");
    crm.add_tag("picked-vip");

    create(
        &engine,
        tenant,
        json!({
            "nodes": [
                { "id": "trigger", "kind": "trigger", "subtype": "status_changed", "config": { "toStatusId": "contacted" } },
                { "id": "check", "kind": "condition", "subtype": "if_else", "config": { "branches": [
                    { "id": "hot", "name": "Hot", "conditions": [
                        { "field": "temperature", "operator": "equals", "value": "HOT" }
                    ] },
                    { "id": "vip", "name": "VIP", "conditions": [
                        { "field": "hasTag", "operator": "contains", "value": "vip" }
                    ] }
                ] } },
                { "id": "b-hot", "kind": "branch" },
                { "id": "b-vip", "kind": "branch" },
                { "id": "b-none", "kind": "branch" },
                { "id": "tag-hot", "kind": "action", "subtype": "add_tag", "config": { "tagId": "picked-hot" } },
                { "id": "tag-vip", "kind": "action", "subtype": "add_tag", "config": { "tagId": "picked-vip" } }
            ],
            "edges": [
                { "from": "trigger", "to": "check" },
                { "from": "check", "to": "b-hot", "branchId": "hot" },
                { "from": "check", "to": "b-vip", "branchId": "vip" },
                { "from": "check", "to": "b-none", "branchId": "none" },
                { "from": "b-hot", "to": "tag-hot" },
                { "from": "b-vip", "to": "tag-vip" }
            ]
        }),
        true,
    )
    .await
    .unwrap();

    engine.dispatcher.dispatch(status_changed(tenant)).await.unwrap();

    assert_eq!(crm.record("lead-1").unwrap().tag_ids, vec!["vip", "picked-hot"]);
}

#[tokio::test]
async fn trigger_filters_and_tenants_narrow_dispatch() {
    let (_, crm, engine) = setup();
    let tenant = Uuid::new_v4();
    crm.add_record(lead(Temperature::Hot));
    crm.add_user("U1");
    create(&engine, Uuid::new_v4(), hot_unassigned_graph(), true).await.unwrap();
    create(
        &engine,
        tenant,
        json!({
            "nodes": [
                { "id": "trigger", "kind": "trigger", "subtype": "status_changed", "config": { "toStatusId": "won" } },
                { "id": "assign", "kind": "action", "subtype": "assign_user", "config": { "userId": "U1" } }
            ],
            "edges": [{ "from": "trigger", "to": "assign" }]
        }),
        true,
    )
    .await
    .unwrap();

    let runs = engine.dispatcher.dispatch(status_changed(tenant)).await.unwrap();

    assert!(runs.is_empty());
    assert_eq!(crm.mutation_count(), 0);
}

// ============================================================
// Concurrency and isolation
// ============================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_runs_share_the_round_robin_rotation_fairly() {
    let (store, crm, engine) = setup();
    let engine = Arc::new(engine);
    let tenant = Uuid::new_v4();
    crm.add_record(lead(Temperature::Hot));
    for user in ["A", "B", "C"] {
        crm.add_user(user);
    }
    let id = create(
        &engine,
        tenant,
        json!({
            "nodes": [
                { "id": "trigger", "kind": "trigger", "subtype": "status_changed", "config": {} },
                { "id": "task", "kind": "action", "subtype": "create_task", "config": {
                    "title": "Call lead",
                    "assignee": { "mode": "round_robin", "roundRobinUsers": ["A", "B", "C"] }
                } }
            ],
            "edges": [{ "from": "trigger", "to": "task" }]
        }),
        true,
    )
    .await
    .unwrap();

    let mut handles = Vec::new();
    for _ in 0..9 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine.dispatcher.dispatch(status_changed(tenant)).await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().len(), 1);
    }

    let mut per_user: HashMap<String, usize> = HashMap::new();
    for task in crm.tasks() {
        *per_user.entry(task.assignee_id.unwrap()).or_default() += 1;
    }
    assert_eq!(per_user.len(), 3);
    assert!(per_user.values().all(|&n| n == 3), "uneven rotation: {per_user:?}");
    assert_eq!(store.peek_cursor(id, "task").await.unwrap(), 9);
}

#[tokio::test]
async fn failing_automation_does_not_affect_its_sibling() {
    let (_, crm, engine) = setup();
    let tenant = Uuid::new_v4();
    crm.add_record(lead(Temperature::Warm));
    crm.add_tag("touched");

    let broken = create(
        &engine,
        tenant,
        json!({
            "nodes": [
                { "id": "trigger", "kind": "trigger", "subtype": "status_changed", "config": {} },
                { "id": "status", "kind": "action", "subtype": "update_status", "config": { "statusId": "archived" } }
            ],
            "edges": [{ "from": "trigger", "to": "status" }]
        }),
        true,
    )
    .await
    .unwrap();
    let healthy = create(
        &engine,
        tenant,
        json!({
            "nodes": [
                { "id": "trigger", "kind": "trigger", "subtype": "status_changed", "config": {} },
                { "id": "tag", "kind": "action", "subtype": "add_tag", "config": { "tagId": "touched" } }
            ],
            "edges": [{ "from": "trigger", "to": "tag" }]
        }),
        true,
    )
    .await
    .unwrap();

    let runs = engine.dispatcher.dispatch(status_changed(tenant)).await.unwrap();
    assert_eq!(runs.len(), 2);

    let broken_runs = engine.service.runs(broken, Page::default()).await.unwrap();
    assert!(broken_runs[0].is(RunStatus::Failed));
    let healthy_runs = engine.service.runs(healthy, Page::default()).await.unwrap();
    assert!(healthy_runs[0].is(RunStatus::Completed));
    assert_eq!(crm.record("lead-1").unwrap().tag_ids, vec!["touched"]);
}

struct PanickingNotifier;

#[async_trait]
impl Notifier for PanickingNotifier {
    async fn notify(&self, _ctx: &ActionContext, _notification: Notification) -> Result<(), ActionError> {
        panic!("notification service crashed");
    }
}

#[tokio::test]
async fn panicking_run_is_failed_and_its_sibling_still_completes() {
    let store = Arc::new(MemoryStore::new());
    let crm = Arc::new(InMemoryCrm::new());
    let collaborators = Collaborators {
        records: crm.clone(),
        tasks: crm.clone(),
        notifier: Arc::new(PanickingNotifier),
    };
    let engine = AutomationEngine::new(Stores::single(Arc::clone(&store)), collaborators, EngineConfig::default());
    let tenant = Uuid::new_v4();
    crm.add_record(lead(Temperature::Warm));
    crm.add_tag("touched");

    let crashing = create(
        &engine,
        tenant,
        json!({
            "nodes": [
                { "id": "trigger", "kind": "trigger", "subtype": "status_changed", "config": {} },
                { "id": "notify", "kind": "action", "subtype": "send_notification",
                  "config": { "userId": "U1", "message": "Lead moved" } }
            ],
            "edges": [{ "from": "trigger", "to": "notify" }]
        }),
        true,
    )
    .await
    .unwrap();
    let healthy = create(
        &engine,
        tenant,
        json!({
            "nodes": [
                { "id": "trigger", "kind": "trigger", "subtype": "status_changed", "config": {} },
                { "id": "tag", "kind": "action", "subtype": "add_tag", "config": { "tagId": "touched" } }
            ],
            "edges": [{ "from": "trigger", "to": "tag" }]
        }),
        true,
    )
    .await
    .unwrap();

    let runs = engine.dispatcher.dispatch(status_changed(tenant)).await.unwrap();
    assert_eq!(runs.len(), 2);

    let crashed = &engine.service.runs(crashing, Page::default()).await.unwrap()[0];
    assert!(crashed.is(RunStatus::Failed));
    let message = crashed.error_message.as_deref().unwrap_or_default();
    assert!(message.starts_with("automation run aborted"), "{message}");

    let healthy_runs = engine.service.runs(healthy, Page::default()).await.unwrap();
    assert!(healthy_runs[0].is(RunStatus::Completed));
    assert_eq!(crm.record("lead-1").unwrap().tag_ids, vec!["touched"]);
}

// ============================================================
// Test runner
// ============================================================

#[tokio::test]
async fn test_runner_runs_a_draft_once_without_activating_it() {
    let (_, crm, engine) = setup();
    let tenant = Uuid::new_v4();
    crm.add_record(lead(Temperature::Hot));
    crm.add_user("U1");
    let id = create(&engine, tenant, hot_unassigned_graph(), false).await.unwrap();

    // Inactive: real events don't reach it.
    assert!(engine.dispatcher.dispatch(status_changed(tenant)).await.unwrap().is_empty());

    let run = engine.test_runner.test(id, "lead-1").await.unwrap();
    assert_eq!(run.triggered_by, MANUAL_TEST);
    assert!(run.is(RunStatus::Completed));

    let runs = engine.service.runs(id, Page::default()).await.unwrap();
    assert_eq!(runs.len(), 1);
    let automation = engine.service.get(id).await.unwrap();
    assert!(!automation.is_active);
    assert_eq!(automation.run_count, 1);
    assert_eq!(crm.tasks().len(), 1);
}

#[tokio::test]
async fn test_runner_reports_unknown_automation() {
    let (_, _, engine) = setup();
    let missing = Uuid::new_v4();

    let err = engine.test_runner.test(missing, "lead-1").await.unwrap_err();

    assert!(matches!(err, EngineError::NotFound { entity: "automation", id } if id == missing));
}

// ============================================================
// Background loops
// ============================================================

#[tokio::test]
async fn dispatcher_loop_runs_emitted_events_until_shutdown() {
    let (bus, stream) = queue::channel();
    let store = Arc::new(MemoryStore::new());
    let crm = Arc::new(InMemoryCrm::new().with_event_bus(bus.clone()));
    let engine = AutomationEngine::in_memory(Arc::clone(&store), Arc::clone(&crm), EngineConfig::default());
    let tenant = Uuid::new_v4();
    crm.add_record(lead(Temperature::Hot));
    crm.add_user("U1");
    let id = create(&engine, tenant, hot_unassigned_graph(), true).await.unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let loop_handle = tokio::spawn(Arc::clone(&engine.dispatcher).run(stream, shutdown_rx));

    bus.emit(status_changed(tenant));

    let mut completed = false;
    for _ in 0..100 {
        let runs = engine.service.runs(id, Page::default()).await.unwrap();
        if runs.first().is_some_and(|r| r.is(RunStatus::Completed)) {
            completed = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(10)).await;
    }
    assert!(completed, "run never completed");

    shutdown_tx.send(true).unwrap();
    loop_handle.await.unwrap();
}

#[tokio::test]
async fn scheduler_loop_survives_a_zero_poll_interval() {
    let store = Arc::new(MemoryStore::new());
    let crm = Arc::new(InMemoryCrm::new());
    let config = EngineConfig { resume_poll_interval: StdDuration::ZERO, ..EngineConfig::default() };
    let engine = AutomationEngine::in_memory(store, crm, config);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let loop_handle = tokio::spawn(Arc::clone(&engine.scheduler).run(shutdown_rx));
    tokio::time::sleep(StdDuration::from_millis(50)).await;

    shutdown_tx.send(true).unwrap();
    loop_handle.await.expect("scheduler loop exits cleanly");
}
