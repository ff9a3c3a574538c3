//! In-process implementation of every store trait.
//!
//! Each table is a `Mutex`-guarded collection; no lock is held across an
//! await. Status updates mirror the Postgres `WHERE status = ...` guard.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AuditSink, HistoryStore, JobStore, MediaStore, VehicleStore};
use crate::error::{Error, Result};
use crate::model::history::{AuditEntry, HistoryEntry};
use crate::model::job::{Job, JobFilter, JobId, JobStatus, NewJob, validate_transition};
use crate::model::vehicle::{MediaRef, NewMediaRef, Vehicle};

#[derive(Default)]
pub struct MemoryStore {
    jobs: Mutex<Vec<Job>>,
    audit: Mutex<Vec<AuditEntry>>,
    history: Mutex<Vec<HistoryEntry>>,
    vehicles: Mutex<HashMap<String, Vehicle>>,
    media: Mutex<Vec<MediaRef>>,
    next_media_id: Mutex<i64>,
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock()
        .map_err(|_| Error::Other("memory store lock poisoned".to_string()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a vehicle row.
    pub fn put_vehicle(&self, vehicle: Vehicle) -> Result<()> {
        lock(&self.vehicles)?.insert(vehicle.vin.clone(), vehicle);
        Ok(())
    }

    /// Every audit entry, in append order.
    pub fn audit_entries(&self) -> Result<Vec<AuditEntry>> {
        Ok(lock(&self.audit)?.clone())
    }

    /// Apply `f` to the job if it is currently `from`, then stamp `to`.
    fn update_job(
        &self,
        id: JobId,
        from: JobStatus,
        to: JobStatus,
        f: impl FnOnce(&mut Job),
    ) -> Result<Job> {
        validate_transition(from, to)?;
        let mut jobs = lock(&self.jobs)?;
        let job = jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| Error::NotFound(format!("job {id}")))?;
        if job.status != from {
            return Err(Error::InvalidTransition {
                from: job.status.to_string(),
                to: to.to_string(),
            });
        }
        let now = Utc::now();
        f(job);
        job.status = to;
        job.updated_at = now;
        if to.is_terminal() {
            job.completed_at = Some(now);
        }
        Ok(job.clone())
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, new: NewJob, default_max_retries: u32) -> Result<Job> {
        let job = Job::from_new(new, default_max_retries, Utc::now());
        lock(&self.jobs)?.push(job.clone());
        Ok(job)
    }

    async fn get_job(&self, id: JobId) -> Result<Job> {
        lock(&self.jobs)?
            .iter()
            .find(|j| j.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {id}")))
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
        let mut jobs = lock(&self.jobs)?;
        // Insertion order breaks created_at ties.
        let next = jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Pending && j.run_after <= now)
            .min_by_key(|j| j.created_at);
        Ok(next.map(|job| {
            job.status = JobStatus::Processing;
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn complete_job(&self, id: JobId) -> Result<Job> {
        self.update_job(id, JobStatus::Processing, JobStatus::Completed, |_| {})
    }

    async fn retry_job(&self, id: JobId, error: &str, run_after: DateTime<Utc>) -> Result<Job> {
        let exhausted = lock(&self.jobs)?
            .iter()
            .any(|j| j.id == id && !j.has_retries_left());
        if exhausted {
            return Err(Error::Other(format!("job {id} has no retries left")));
        }
        self.update_job(id, JobStatus::Processing, JobStatus::Pending, |job| {
            job.retries += 1;
            job.error = Some(error.to_string());
            job.run_after = run_after;
        })
    }

    async fn fail_job(&self, id: JobId, error: &str) -> Result<Job> {
        self.update_job(id, JobStatus::Processing, JobStatus::Failed, |job| {
            job.error = Some(error.to_string());
        })
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let jobs = lock(&self.jobs)?;
        let mut out: Vec<Job> = jobs
            .iter()
            .filter(|j| filter.status.is_none_or(|s| j.status == s))
            .filter(|j| filter.job_type.as_deref().is_none_or(|t| j.job_type == t))
            .cloned()
            .collect();
        out.sort_by_key(|j| j.created_at);
        if let Some(limit) = filter.limit {
            out.truncate(limit.max(0) as usize);
        }
        Ok(out)
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn log(
        &self,
        event_type: &str,
        details: serde_json::Value,
        user: Option<&str>,
    ) -> Result<()> {
        lock(&self.audit)?.push(AuditEntry {
            event_type: event_type.to_string(),
            details,
            user: user.map(str::to_string),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let audit = lock(&self.audit)?;
        Ok(audit
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn append_history(&self, entries: &[HistoryEntry]) -> Result<()> {
        lock(&self.history)?.extend_from_slice(entries);
        Ok(())
    }

    async fn history_for(&self, vin: &str) -> Result<Vec<HistoryEntry>> {
        Ok(lock(&self.history)?
            .iter()
            .filter(|h| h.vin == vin)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl VehicleStore for MemoryStore {
    async fn get_vehicle(&self, vin: &str) -> Result<Option<Vehicle>> {
        Ok(lock(&self.vehicles)?.get(vin).cloned())
    }

    async fn set_seo_description(&self, vin: &str, text: &str) -> Result<()> {
        let mut vehicles = lock(&self.vehicles)?;
        let vehicle = vehicles
            .get_mut(vin)
            .ok_or_else(|| Error::NotFound(format!("vehicle {vin}")))?;
        vehicle.seo_description = Some(text.to_string());
        Ok(())
    }

    async fn backfill_primary_image(&self, vin: &str, url: &str) -> Result<bool> {
        let mut vehicles = lock(&self.vehicles)?;
        let vehicle = vehicles
            .get_mut(vin)
            .ok_or_else(|| Error::NotFound(format!("vehicle {vin}")))?;
        if vehicle.primary_image_url.as_deref().is_some_and(|u| !u.is_empty()) {
            return Ok(false);
        }
        vehicle.primary_image_url = Some(url.to_string());
        Ok(true)
    }
}

#[async_trait]
impl MediaStore for MemoryStore {
    async fn list_media(&self, vin: &str) -> Result<Vec<MediaRef>> {
        let mut out: Vec<MediaRef> = lock(&self.media)?
            .iter()
            .filter(|m| m.vin == vin)
            .cloned()
            .collect();
        out.sort_by_key(|m| (m.position, m.id));
        Ok(out)
    }

    async fn delete_media(&self, ids: &[i64]) -> Result<()> {
        lock(&self.media)?.retain(|m| !ids.contains(&m.id));
        Ok(())
    }

    async fn insert_media(&self, refs: &[NewMediaRef]) -> Result<()> {
        let mut media = lock(&self.media)?;
        let mut next_id = lock(&self.next_media_id)?;
        for new in refs {
            *next_id += 1;
            media.push(MediaRef {
                id: *next_id,
                vin: new.vin.clone(),
                file_id: new.file_id.clone(),
                url: new.url.clone(),
                mime_type: new.mime_type.clone(),
                position: new.position,
            });
        }
        Ok(())
    }
}
