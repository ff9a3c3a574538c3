//! Append-only audit and history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One changed field on a vehicle, as persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub vin: String,
    pub user: String,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A system-level audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_type: String,
    pub details: serde_json::Value,
    pub user: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Render a JSON value the way history columns store it: strings bare,
/// null as absent, everything else as compact JSON.
pub fn display_value(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strings_are_stored_unquoted() {
        assert_eq!(display_value(&json!("Red")), Some("Red".to_string()));
        assert_eq!(display_value(&json!(42000)), Some("42000".to_string()));
        assert_eq!(display_value(&json!(null)), None);
    }
}
