//! Domain events.
//!
//! The variant of [`DomainEvent`] is the event name, so a payload can never
//! be published under the wrong name. Events are emitted synchronously and
//! never persisted by the bus itself.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    #[serde(rename = "vehicle.updated")]
    VehicleUpdated,
    #[serde(rename = "inspection.completed")]
    InspectionCompleted,
    #[serde(rename = "deposit.created")]
    DepositCreated,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "role.updated")]
    RoleUpdated,
}

impl EventName {
    pub const ALL: [EventName; 5] = [
        EventName::VehicleUpdated,
        EventName::InspectionCompleted,
        EventName::DepositCreated,
        EventName::TaskCompleted,
        EventName::RoleUpdated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::VehicleUpdated => "vehicle.updated",
            EventName::InspectionCompleted => "inspection.completed",
            EventName::DepositCreated => "deposit.created",
            EventName::TaskCompleted => "task.completed",
            EventName::RoleUpdated => "role.updated",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One field's before/after values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: serde_json::Value,
    pub new: serde_json::Value,
}

impl FieldChange {
    pub fn new(old: impl Into<serde_json::Value>, new: impl Into<serde_json::Value>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.old == self.new
    }
}

/// A business-significant state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    VehicleUpdated {
        vin: String,
        changes: BTreeMap<String, FieldChange>,
        user: String,
    },
    InspectionCompleted {
        inspection_id: String,
        vin: String,
        passed: bool,
        user: String,
    },
    DepositCreated {
        deposit_id: String,
        /// Integer cents.
        amount: i64,
        vin: String,
        user: String,
    },
    TaskCompleted {
        task_id: String,
        vin: Option<String>,
        user: String,
    },
    RoleUpdated {
        role_id: String,
        role_name: String,
        permissions: Vec<String>,
        user: String,
    },
}

impl DomainEvent {
    pub fn name(&self) -> EventName {
        match self {
            DomainEvent::VehicleUpdated { .. } => EventName::VehicleUpdated,
            DomainEvent::InspectionCompleted { .. } => EventName::InspectionCompleted,
            DomainEvent::DepositCreated { .. } => EventName::DepositCreated,
            DomainEvent::TaskCompleted { .. } => EventName::TaskCompleted,
            DomainEvent::RoleUpdated { .. } => EventName::RoleUpdated,
        }
    }

    /// The acting user carried by every event.
    pub fn user(&self) -> &str {
        match self {
            DomainEvent::VehicleUpdated { user, .. }
            | DomainEvent::InspectionCompleted { user, .. }
            | DomainEvent::DepositCreated { user, .. }
            | DomainEvent::TaskCompleted { user, .. }
            | DomainEvent::RoleUpdated { user, .. } => user,
        }
    }
}

/// An event paired with the instant it was emitted.
#[derive(Debug, Clone, Serialize)]
pub struct Emitted {
    pub at: DateTime<Utc>,
    pub event: DomainEvent,
}
