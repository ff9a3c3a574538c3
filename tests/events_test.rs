//! Integration tests for the domain event bus and its listeners.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use lotq::app::App;
use lotq::error::{Error, Result};
use lotq::events::{EventBus, listener_fn};
use lotq::model::event::{DomainEvent, EventName, FieldChange};
use lotq::model::history::AuditEntry;
use lotq::queue::QueueConfig;
use lotq::store::{AuditSink, HistoryStore, MemoryStore};

fn vehicle_updated(changes: &[(&str, FieldChange)]) -> DomainEvent {
    DomainEvent::VehicleUpdated {
        vin: "1HGCV1F56KA000001".into(),
        changes: changes
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<BTreeMap<_, _>>(),
        user: "pat".into(),
    }
}

fn task_completed() -> DomainEvent {
    DomainEvent::TaskCompleted {
        task_id: "t-1".into(),
        vin: None,
        user: "sam".into(),
    }
}

async fn wait_for_audit(store: &MemoryStore, count: usize) -> Vec<AuditEntry> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let entries = store.audit_entries().unwrap();
        if entries.len() >= count {
            return entries;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {count} audit entries, have {}",
            entries.len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn listeners_run_in_registration_order() {
    let bus = EventBus::without_audit();
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["first", "second", "third"] {
        let order = order.clone();
        bus.on(
            EventName::TaskCompleted,
            listener_fn(name, move |_| {
                let order = order.clone();
                async move {
                    order.lock().unwrap().push(name);
                    Ok(())
                }
            }),
        );
    }

    bus.emit(task_completed()).await.unwrap();
    assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn failing_listener_does_not_stop_the_rest() {
    let bus = EventBus::without_audit();
    let ran = Arc::new(Mutex::new(Vec::new()));

    bus.on(
        EventName::TaskCompleted,
        listener_fn("broken", |_| async move {
            Err(Error::Other("listener exploded".into()))
        }),
    );
    let log = ran.clone();
    bus.on(
        EventName::TaskCompleted,
        listener_fn("healthy", move |_| {
            let log = log.clone();
            async move {
                log.lock().unwrap().push("healthy");
                Ok(())
            }
        }),
    );

    let err = bus.emit(task_completed()).await.unwrap_err();
    assert_eq!(err.event, EventName::TaskCompleted);
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].listener, "broken");
    assert_eq!(*ran.lock().unwrap(), vec!["healthy"]);
}

#[tokio::test]
async fn listeners_only_see_their_event() {
    let bus = EventBus::without_audit();
    let seen = Arc::new(Mutex::new(0));

    let count = seen.clone();
    bus.on(
        EventName::DepositCreated,
        listener_fn("deposits", move |_| {
            let count = count.clone();
            async move {
                *count.lock().unwrap() += 1;
                Ok(())
            }
        }),
    );

    bus.emit(task_completed()).await.unwrap();
    assert_eq!(*seen.lock().unwrap(), 0);
    assert_eq!(bus.listener_count(EventName::DepositCreated), 1);
    assert_eq!(bus.listener_count(EventName::TaskCompleted), 0);
}

#[tokio::test]
async fn emit_without_listeners_succeeds() {
    let bus = EventBus::without_audit();
    bus.emit(task_completed()).await.unwrap();
}

#[tokio::test]
async fn every_event_is_mirrored_to_audit() {
    let store = Arc::new(MemoryStore::new());
    let bus = EventBus::new(store.clone());

    bus.emit(DomainEvent::DepositCreated {
        deposit_id: "d-9".into(),
        amount: 50_000,
        vin: "1HGCV1F56KA000001".into(),
        user: "lee".into(),
    })
    .await
    .unwrap();

    let entries = wait_for_audit(&store, 1).await;
    assert_eq!(entries[0].event_type, "deposit.created");
    assert_eq!(entries[0].user.as_deref(), Some("lee"));
    assert_eq!(entries[0].details["amount"], json!(50_000));
    assert_eq!(entries[0].details["deposit_id"], json!("d-9"));
}

struct BrokenAudit;

#[async_trait]
impl AuditSink for BrokenAudit {
    async fn log(&self, _: &str, _: serde_json::Value, _: Option<&str>) -> Result<()> {
        Err(Error::Other("audit table unavailable".into()))
    }

    async fn recent_audit(&self, _: i64) -> Result<Vec<AuditEntry>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn audit_failure_never_reaches_emitter() {
    let bus = EventBus::new(Arc::new(BrokenAudit));
    let ran = Arc::new(Mutex::new(false));

    let flag = ran.clone();
    bus.on(
        EventName::TaskCompleted,
        listener_fn("flag", move |_| {
            let flag = flag.clone();
            async move {
                *flag.lock().unwrap() = true;
                Ok(())
            }
        }),
    );

    bus.emit(task_completed()).await.unwrap();
    // Let the detached write run and fail.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(*ran.lock().unwrap());
}

#[tokio::test]
async fn vehicle_update_writes_one_row_per_changed_field() {
    let env = App::in_memory(QueueConfig::default());

    env.app
        .bus
        .emit(vehicle_updated(&[
            ("color", FieldChange::new("Red", "Blue")),
            ("status", FieldChange::new("AVAILABLE", "AVAILABLE")),
        ]))
        .await
        .unwrap();

    let rows = env
        .app
        .history
        .history_for("1HGCV1F56KA000001")
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].field, "color");
    assert_eq!(rows[0].old_value.as_deref(), Some("Red"));
    assert_eq!(rows[0].new_value.as_deref(), Some("Blue"));
    assert_eq!(rows[0].user, "pat");

    let audit = wait_for_audit(&env.store, 1).await;
    assert_eq!(audit[0].event_type, "vehicle.updated");
}

#[tokio::test]
async fn vehicle_update_records_numbers_and_nulls() {
    let env = App::in_memory(QueueConfig::default());

    env.app
        .bus
        .emit(vehicle_updated(&[
            ("mileage", FieldChange::new(41_000, 42_000)),
            ("trim", FieldChange::new(serde_json::Value::Null, "EX-L")),
        ]))
        .await
        .unwrap();

    let rows = env
        .app
        .history
        .history_for("1HGCV1F56KA000001")
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);

    let trim = rows.iter().find(|r| r.field == "trim").unwrap();
    assert_eq!(trim.old_value, None);
    assert_eq!(trim.new_value.as_deref(), Some("EX-L"));

    let mileage = rows.iter().find(|r| r.field == "mileage").unwrap();
    assert_eq!(mileage.old_value.as_deref(), Some("41000"));
    assert_eq!(mileage.new_value.as_deref(), Some("42000"));
}

#[tokio::test]
async fn app_subscribes_a_listener_to_every_event() {
    let env = App::in_memory(QueueConfig::default());
    for name in EventName::ALL {
        assert!(env.app.bus.listener_count(name) >= 1, "{name} has no listener");
    }
}
