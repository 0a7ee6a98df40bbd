//! Walker tests over the in-memory store and CRM.
//!
//! Runs are started through the dispatcher exactly as a domain event would
//! start them, then inspected through the run log.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use db::models::{AutomationPatch, AutomationRow, ExecutionRunRow, NewAutomation, Page, RunStatus};
use db::{AutomationStore, DbError, MemoryStore};
use nodes::mock::InMemoryCrm;
use nodes::{RecordSnapshot, Temperature};
use queue::{event_types, DomainEvent, EventStream};

use crate::service::CreateAutomation;
use crate::walker::ResumeState;
use crate::{AutomationEngine, Collaborators, EngineConfig, Stores};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Harness {
    store: Arc<MemoryStore>,
    crm: Arc<InMemoryCrm>,
    engine: AutomationEngine,
    events: EventStream,
    tenant: Uuid,
}

fn harness(config: EngineConfig) -> Harness {
    let (bus, events) = queue::channel();
    let store = Arc::new(MemoryStore::new());
    let crm = Arc::new(InMemoryCrm::new().with_event_bus(bus));
    crm.add_record(RecordSnapshot::new("rec-1"));
    let engine = AutomationEngine::in_memory(Arc::clone(&store), Arc::clone(&crm), config);
    Harness { store, crm, engine, events, tenant: Uuid::new_v4() }
}

impl Harness {
    async fn automation(&self, graph: Value) -> Uuid {
        self.engine
            .service
            .create(
                self.tenant,
                CreateAutomation {
                    name: "under test".into(),
                    description: None,
                    workflow_graph: graph,
                    is_active: true,
                },
            )
            .await
            .expect("graph is valid")
            .id
    }

    fn event(&self, event_type: &str, payload: Value) -> DomainEvent {
        DomainEvent::new(self.tenant, event_type, "rec-1", payload, "user-1")
    }

    async fn fire(&self, event_type: &str, payload: Value) -> Vec<Uuid> {
        self.engine
            .dispatcher
            .dispatch(self.event(event_type, payload))
            .await
            .expect("dispatch")
    }

    async fn run(&self, run_id: Uuid) -> ExecutionRunRow {
        self.engine.service.run(run_id).await.expect("run exists")
    }

    async fn runs(&self, automation_id: Uuid) -> Vec<ExecutionRunRow> {
        self.engine
            .service
            .runs(automation_id, Page::new(1, 100))
            .await
            .expect("run log")
    }
}

fn trigger(subtype: &str) -> Value {
    json!({ "id": "trigger", "kind": "trigger", "subtype": subtype, "config": {} })
}

fn action(id: &str, subtype: &str, config: Value) -> Value {
    json!({ "id": id, "kind": "action", "subtype": subtype, "config": config })
}

fn chain(nodes: Vec<Value>) -> Value {
    let ids: Vec<String> = nodes
        .iter()
        .map(|n| n["id"].as_str().unwrap_or_default().to_owned())
        .collect();
    let edges: Vec<Value> = ids
        .windows(2)
        .map(|w| json!({ "from": w[0], "to": w[1] }))
        .collect();
    json!({ "nodes": nodes, "edges": edges })
}

fn wait_one_hour(id: &str) -> Value {
    action(id, "wait", json!({ "amount": 1, "unit": "hours" }))
}

// ============================================================
// Suspend / resume
// ============================================================

#[tokio::test]
async fn wait_suspends_and_resume_continues_at_the_stored_node_after_restart() {
    let h = harness(EngineConfig::default());
    h.crm.add_tag("followed-up");
    h.automation(chain(vec![
        trigger("record_created"),
        wait_one_hour("wait"),
        action("tag", "add_tag", json!({ "tagId": "followed-up" })),
    ]))
    .await;

    let runs = h.fire(event_types::RECORD_CREATED, json!({})).await;
    assert_eq!(runs.len(), 1);

    let suspended = h.run(runs[0]).await;
    assert!(suspended.is(RunStatus::Suspended));
    let state: ResumeState =
        serde_json::from_value(suspended.resume_state.clone().expect("resume state stored")).unwrap();
    assert_eq!(state.next_node_id, "tag");
    assert_eq!(state.hops, 2);
    assert!(h.crm.record("rec-1").unwrap().tag_ids.is_empty());

    // Fresh engine over the same store: nothing was held in memory.
    let restarted = AutomationEngine::in_memory(
        Arc::clone(&h.store),
        Arc::clone(&h.crm),
        EngineConfig::default(),
    );
    let now = Utc::now();
    assert_eq!(restarted.scheduler.tick_at(now).await.unwrap(), 0);
    assert_eq!(
        restarted.scheduler.tick_at(now + Duration::minutes(61)).await.unwrap(),
        1
    );

    let finished = h.run(runs[0]).await;
    assert!(finished.is(RunStatus::Completed), "status was {}", finished.status);
    assert_eq!(h.crm.record("rec-1").unwrap().tag_ids, vec!["followed-up"]);
}

#[tokio::test]
async fn second_resume_of_the_same_run_is_a_no_op() {
    let h = harness(EngineConfig::default());
    h.crm.add_tag("t1");
    h.automation(chain(vec![
        trigger("record_created"),
        wait_one_hour("wait"),
        action("tag", "add_tag", json!({ "tagId": "t1" })),
    ]))
    .await;
    let runs = h.fire(event_types::RECORD_CREATED, json!({})).await;

    let first = h.engine.walker.resume(runs[0]).await.unwrap();
    let second = h.engine.walker.resume(runs[0]).await.unwrap();

    assert!(first.is_some_and(|r| r.is(RunStatus::Completed)));
    assert!(second.is_none());
    assert_eq!(h.crm.mutation_count(), 1);
}

#[tokio::test]
async fn trailing_wait_completes_the_run() {
    let h = harness(EngineConfig::default());
    h.automation(chain(vec![trigger("record_created"), wait_one_hour("wait")])).await;

    let runs = h.fire(event_types::RECORD_CREATED, json!({})).await;

    let run = h.run(runs[0]).await;
    assert!(run.is(RunStatus::Completed));
    assert!(run.resume_state.is_none());
}

#[tokio::test]
async fn out_of_range_wait_fails_the_run() {
    let h = harness(EngineConfig::default());
    let graph = chain(vec![
        trigger("record_created"),
        action("wait", "wait", json!({ "amount": 4_000_000_000u32, "unit": "days" })),
        action("notify", "send_notification", json!({ "userId": "U1", "message": "later" })),
    ]);
    // Written straight to the store, skipping save-time validation.
    h.store
        .create_automation(NewAutomation {
            tenant_id: h.tenant,
            name: "imported".into(),
            description: None,
            workflow_graph: graph,
            is_active: true,
            is_draft: false,
        })
        .await
        .unwrap();

    let runs = h.fire(event_types::RECORD_CREATED, json!({})).await;

    let run = h.run(runs[0]).await;
    assert!(run.is(RunStatus::Failed));
    let message = run.error_message.unwrap_or_default();
    assert!(message.contains("out of range"), "{message}");
    assert!(h.crm.notifications().is_empty());
}

#[tokio::test]
async fn cancelled_run_is_never_resumed() {
    let h = harness(EngineConfig::default());
    h.crm.add_tag("t1");
    h.automation(chain(vec![
        trigger("record_created"),
        wait_one_hour("wait"),
        action("tag", "add_tag", json!({ "tagId": "t1" })),
    ]))
    .await;
    let runs = h.fire(event_types::RECORD_CREATED, json!({})).await;

    assert!(h.engine.service.cancel_run(runs[0]).await.unwrap());
    assert!(!h.engine.service.cancel_run(runs[0]).await.unwrap());
    assert_eq!(
        h.engine.scheduler.tick_at(Utc::now() + Duration::days(1)).await.unwrap(),
        0
    );

    let run = h.run(runs[0]).await;
    assert!(run.is(RunStatus::Failed));
    assert_eq!(run.error_message.as_deref(), Some("cancelled"));
    assert_eq!(h.crm.mutation_count(), 0);
}

// ============================================================
// Failures
// ============================================================

#[tokio::test]
async fn missing_entity_fails_the_run_and_keeps_earlier_actions() {
    let h = harness(EngineConfig::default());
    h.crm.add_tag("t1");
    h.crm.add_tag("t2");
    let id = h
        .automation(chain(vec![
            trigger("record_created"),
            action("first", "add_tag", json!({ "tagId": "t1" })),
            action("status", "update_status", json!({ "statusId": "deleted-status" })),
            action("last", "add_tag", json!({ "tagId": "t2" })),
        ]))
        .await;

    h.fire(event_types::RECORD_CREATED, json!({})).await;

    let runs = h.runs(id).await;
    assert_eq!(runs.len(), 1);
    assert!(runs[0].is(RunStatus::Failed));
    let message = runs[0].error_message.as_deref().unwrap_or_default();
    assert!(message.contains("action 'status' failed"), "message was {message}");
    assert!(message.contains("deleted-status"), "message was {message}");
    assert_eq!(h.crm.record("rec-1").unwrap().tag_ids, vec!["t1"]);
}

#[tokio::test]
async fn self_retriggering_automation_is_stopped_by_the_loop_guard() {
    let mut h = harness(EngineConfig { max_hops: 6, ..EngineConfig::default() });
    h.crm.add_status("s1");
    let id = h
        .automation(chain(vec![
            trigger("status_changed"),
            action("set", "update_status", json!({ "statusId": "s1" })),
        ]))
        .await;

    h.fire(event_types::STATUS_CHANGED, json!({ "toStatusId": "s0" })).await;
    let mut rounds = 0;
    while let Some(event) = h.events.try_recv() {
        rounds += 1;
        assert!(rounds < 20, "loop guard never tripped");
        h.engine.dispatcher.dispatch(event).await.unwrap();
    }

    // Each run spends two hops; the fourth starts at depth 6 and trips.
    let runs = h.runs(id).await;
    assert_eq!(runs.len(), 4);
    assert!(runs[0].is(RunStatus::Failed));
    assert!(runs[0]
        .error_message
        .as_deref()
        .is_some_and(|m| m.starts_with("loop guard")));
    assert!(runs[1..].iter().all(|r| r.is(RunStatus::Completed)));
}

// ============================================================
// Record freshness
// ============================================================

#[tokio::test]
async fn conditions_see_the_effects_of_earlier_actions() {
    let h = harness(EngineConfig::default());
    let mut record = RecordSnapshot::new("rec-1");
    record.temperature = Some(Temperature::Cold);
    h.crm.add_record(record);
    h.crm.add_tag("hot-lead");

    h.automation(json!({
        "nodes": [
            trigger("record_created"),
            action("heat", "update_temperature", json!({ "temperature": "HOT" })),
            { "id": "check", "kind": "condition", "subtype": "if_else", "config": { "branches": [
                { "id": "hot", "name": "Hot", "conditions": [
                    { "field": "temperature", "operator": "equals", "value": "HOT" }
                ] }
            ] } },
            { "id": "on-hot", "kind": "branch" },
            { "id": "on-none", "kind": "branch" },
            action("tag", "add_tag", json!({ "tagId": "hot-lead" }))
        ],
        "edges": [
            { "from": "trigger", "to": "heat" },
            { "from": "heat", "to": "check" },
            { "from": "check", "to": "on-hot", "branchId": "hot" },
            { "from": "check", "to": "on-none", "branchId": "none" },
            { "from": "on-hot", "to": "tag" }
        ]
    }))
    .await;

    let runs = h.fire(event_types::RECORD_CREATED, json!({})).await;

    assert!(h.run(runs[0]).await.is(RunStatus::Completed));
    assert_eq!(h.crm.record("rec-1").unwrap().tag_ids, vec!["hot-lead"]);
}

#[tokio::test]
async fn every_started_run_is_counted_on_the_automation() {
    let h = harness(EngineConfig::default());
    let id = h.automation(chain(vec![trigger("record_created")])).await;

    h.fire(event_types::RECORD_CREATED, json!({})).await;
    h.fire(event_types::RECORD_CREATED, json!({})).await;

    let automation = h.engine.service.get(id).await.unwrap();
    assert_eq!(automation.run_count, 2);
    assert!(automation.last_run_at.is_some());
}

// ============================================================
// Dispatch bookkeeping
// ============================================================

#[tokio::test]
async fn unreadable_active_graph_is_logged_as_a_failed_run() {
    let h = harness(EngineConfig::default());
    let row = h
        .store
        .create_automation(NewAutomation {
            tenant_id: h.tenant,
            name: "stale".into(),
            description: None,
            workflow_graph: json!({
                "nodes": [
                    trigger("record_created"),
                    { "id": "x", "kind": "action", "subtype": "teleport", "config": {} }
                ],
                "edges": [{ "from": "trigger", "to": "x" }]
            }),
            is_active: true,
            is_draft: false,
        })
        .await
        .unwrap();

    let runs = h.fire(event_types::RECORD_CREATED, json!({})).await;
    assert_eq!(runs.len(), 1);
    let run = h.run(runs[0]).await;
    assert!(run.is(RunStatus::Failed));
    assert_eq!(run.automation_id, row.id);
    let message = run.error_message.unwrap_or_default();
    assert!(message.starts_with("malformed graph"), "{message}");

    // A different trigger type is not this automation's event.
    assert!(h.fire(event_types::STATUS_CHANGED, json!({})).await.is_empty());
    assert_eq!(h.runs(row.id).await.len(), 1);
}

/// Delegates to a [`MemoryStore`] but can't record run counts.
struct CounterlessStore(Arc<MemoryStore>);

#[async_trait]
impl AutomationStore for CounterlessStore {
    async fn create_automation(&self, new: NewAutomation) -> Result<AutomationRow, DbError> {
        self.0.create_automation(new).await
    }

    async fn get_automation(&self, id: Uuid) -> Result<AutomationRow, DbError> {
        self.0.get_automation(id).await
    }

    async fn list_automations(&self, tenant_id: Uuid) -> Result<Vec<AutomationRow>, DbError> {
        self.0.list_automations(tenant_id).await
    }

    async fn list_active_automations(&self, tenant_id: Uuid) -> Result<Vec<AutomationRow>, DbError> {
        self.0.list_active_automations(tenant_id).await
    }

    async fn update_automation(&self, id: Uuid, patch: AutomationPatch) -> Result<AutomationRow, DbError> {
        self.0.update_automation(id, patch).await
    }

    async fn delete_automation(&self, id: Uuid) -> Result<(), DbError> {
        self.0.delete_automation(id).await
    }

    async fn record_automation_run(&self, _id: Uuid, _at: DateTime<Utc>) -> Result<(), DbError> {
        Err(DbError::Corrupt("run_count column unavailable".into()))
    }
}

#[tokio::test]
async fn run_is_failed_when_its_count_cannot_be_recorded() {
    let store = Arc::new(MemoryStore::new());
    let crm = Arc::new(InMemoryCrm::new());
    crm.add_record(RecordSnapshot::new("rec-1"));
    let stores = Stores {
        automations: Arc::new(CounterlessStore(Arc::clone(&store))),
        runs: store.clone(),
        cursors: store.clone(),
    };
    let engine = AutomationEngine::new(stores, Collaborators::single(crm), EngineConfig::default());
    let tenant = Uuid::new_v4();
    let automation = engine
        .service
        .create(
            tenant,
            CreateAutomation {
                name: "counted".into(),
                description: None,
                workflow_graph: chain(vec![trigger("record_created")]),
                is_active: true,
            },
        )
        .await
        .unwrap();

    let event = DomainEvent::new(tenant, event_types::RECORD_CREATED, "rec-1", json!({}), "user-1");
    assert!(engine.dispatcher.dispatch(event).await.unwrap().is_empty());

    let runs = engine.service.runs(automation.id, Page::default()).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert!(runs[0].is(RunStatus::Failed));
    assert!(runs[0].error_message.as_deref().is_some_and(|m| m.starts_with("database error")));
}
