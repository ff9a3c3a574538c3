//! Listeners that turn domain events into persisted history.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use super::{EventBus, Listener};
use crate::error::Result;
use crate::model::event::{DomainEvent, Emitted, EventName, FieldChange};
use crate::model::history::{HistoryEntry, display_value};
use crate::store::HistoryStore;

/// Writes one history row per changed field of a `vehicle.updated` event.
pub struct HistoryListener {
    store: Arc<dyn HistoryStore>,
}

impl HistoryListener {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }
}

/// History rows for a change map, skipping fields whose value did not change.
pub fn history_rows(
    vin: &str,
    user: &str,
    changes: &BTreeMap<String, FieldChange>,
    at: DateTime<Utc>,
) -> Vec<HistoryEntry> {
    changes
        .iter()
        .filter(|(_, change)| !change.is_noop())
        .map(|(field, change)| HistoryEntry {
            vin: vin.to_string(),
            user: user.to_string(),
            field: field.clone(),
            old_value: display_value(&change.old),
            new_value: display_value(&change.new),
            created_at: at,
        })
        .collect()
}

#[async_trait]
impl Listener for HistoryListener {
    fn name(&self) -> &str {
        "vehicle-history"
    }

    async fn on_event(&self, emitted: &Emitted) -> Result<()> {
        let DomainEvent::VehicleUpdated { vin, changes, user } = &emitted.event else {
            return Ok(());
        };
        let rows = history_rows(vin, user, changes, emitted.at);
        if rows.is_empty() {
            return Ok(());
        }
        self.store.append_history(&rows).await?;
        info!(vin = %vin, fields = rows.len(), "vehicle history recorded");
        Ok(())
    }
}

/// Logs an event without persisting anything beyond the bus's audit copy.
pub struct LogListener;

#[async_trait]
impl Listener for LogListener {
    fn name(&self) -> &str {
        "log"
    }

    async fn on_event(&self, emitted: &Emitted) -> Result<()> {
        let event = &emitted.event;
        match event {
            DomainEvent::InspectionCompleted {
                inspection_id,
                vin,
                passed,
                ..
            } => info!(%inspection_id, %vin, passed, user = event.user(), "inspection completed"),
            DomainEvent::DepositCreated {
                deposit_id,
                amount,
                vin,
                ..
            } => info!(%deposit_id, amount, %vin, user = event.user(), "deposit created"),
            DomainEvent::TaskCompleted { task_id, vin, .. } => {
                info!(%task_id, vin = ?vin, user = event.user(), "task completed")
            }
            DomainEvent::RoleUpdated {
                role_id,
                role_name,
                permissions,
                ..
            } => info!(
                %role_id,
                %role_name,
                permissions = permissions.len(),
                user = event.user(),
                "role updated"
            ),
            DomainEvent::VehicleUpdated { vin, changes, .. } => {
                info!(%vin, fields = changes.len(), user = event.user(), "vehicle updated")
            }
        }
        Ok(())
    }
}

/// Subscribe the standard listeners: history for vehicle updates, logging
/// for everything else.
pub fn register_all(bus: &EventBus, history: Arc<dyn HistoryStore>) {
    bus.on(
        EventName::VehicleUpdated,
        Arc::new(HistoryListener::new(history)),
    );
    let log: Arc<dyn Listener> = Arc::new(LogListener);
    for name in EventName::ALL {
        if name != EventName::VehicleUpdated {
            bus.on(name, Arc::clone(&log));
        }
    }
}
