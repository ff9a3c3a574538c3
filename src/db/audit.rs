//! Audit log and vehicle history tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::history::{AuditEntry, HistoryEntry};
use crate::store::{AuditSink, HistoryStore};

#[async_trait]
impl AuditSink for super::Db {
    async fn log(
        &self,
        event_type: &str,
        details: serde_json::Value,
        user: Option<&str>,
    ) -> Result<()> {
        sqlx::query("INSERT INTO audit_logs (event_type, details, user_name) VALUES ($1, $2, $3)")
            .bind(event_type)
            .bind(&details)
            .bind(user)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let rows: Vec<(String, serde_json::Value, Option<String>, DateTime<Utc>)> =
            sqlx::query_as(
                "SELECT event_type, details, user_name, created_at
                 FROM audit_logs ORDER BY id DESC LIMIT $1",
            )
            .bind(limit)
            .fetch_all(self.pool())
            .await?;

        Ok(rows
            .into_iter()
            .map(|(event_type, details, user, created_at)| AuditEntry {
                event_type,
                details,
                user,
                created_at,
            })
            .collect())
    }
}

#[async_trait]
impl HistoryStore for super::Db {
    async fn append_history(&self, entries: &[HistoryEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool().begin().await?;
        for entry in entries {
            sqlx::query(
                "INSERT INTO vehicle_history (vin, user_name, field, old_value, new_value, created_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(&entry.vin)
            .bind(&entry.user)
            .bind(&entry.field)
            .bind(&entry.old_value)
            .bind(&entry.new_value)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn history_for(&self, vin: &str) -> Result<Vec<HistoryEntry>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            "SELECT vin, user_name, field, old_value, new_value, created_at
             FROM vehicle_history WHERE vin = $1 ORDER BY created_at, id",
        )
        .bind(vin)
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(HistoryEntry::from).collect())
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    vin: String,
    user_name: String,
    field: String,
    old_value: Option<String>,
    new_value: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<HistoryRow> for HistoryEntry {
    fn from(row: HistoryRow) -> Self {
        Self {
            vin: row.vin,
            user: row.user_name,
            field: row.field,
            old_value: row.old_value,
            new_value: row.new_value,
            created_at: row.created_at,
        }
    }
}
