//! Persistence seams.
//!
//! The engine, bus, listeners and handlers only see these traits. [`Db`]
//! implements all of them against Postgres; [`MemoryStore`] implements them
//! in process for tests and local runs.
//!
//! [`Db`]: crate::db::Db

pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::history::{AuditEntry, HistoryEntry};
use crate::model::job::{Job, JobFilter, JobId, NewJob};
use crate::model::vehicle::{MediaRef, NewMediaRef, Vehicle};

/// Durable job records. Only the engine mutates status.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a PENDING job with zero retries.
    async fn insert_job(&self, new: NewJob, default_max_retries: u32) -> Result<Job>;

    async fn get_job(&self, id: JobId) -> Result<Job>;

    /// Claim the oldest PENDING job eligible at `now`, moving it to PROCESSING.
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>>;

    /// PROCESSING → COMPLETED.
    async fn complete_job(&self, id: JobId) -> Result<Job>;

    /// PROCESSING → PENDING with an incremented retry count.
    async fn retry_job(&self, id: JobId, error: &str, run_after: DateTime<Utc>) -> Result<Job>;

    /// PROCESSING → FAILED. Retry count is left as is.
    async fn fail_job(&self, id: JobId, error: &str) -> Result<Job>;

    /// Jobs matching `filter`, oldest first.
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>>;
}

/// Append-only system audit log.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(
        &self,
        event_type: &str,
        details: serde_json::Value,
        user: Option<&str>,
    ) -> Result<()>;

    async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditEntry>>;
}

/// Append-only per-field vehicle history.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append_history(&self, entries: &[HistoryEntry]) -> Result<()>;

    async fn history_for(&self, vin: &str) -> Result<Vec<HistoryEntry>>;
}

/// Vehicle attributes read and written by handlers.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn get_vehicle(&self, vin: &str) -> Result<Option<Vehicle>>;

    async fn set_seo_description(&self, vin: &str, text: &str) -> Result<()>;

    /// Set the primary image only if none is recorded. Returns whether it was set.
    async fn backfill_primary_image(&self, vin: &str, url: &str) -> Result<bool>;
}

/// Locally recorded media references for a vehicle.
#[async_trait]
pub trait MediaStore: Send + Sync {
    /// All refs for `vin`, ordered by position.
    async fn list_media(&self, vin: &str) -> Result<Vec<MediaRef>>;

    async fn delete_media(&self, ids: &[i64]) -> Result<()>;

    async fn insert_media(&self, refs: &[NewMediaRef]) -> Result<()>;
}
