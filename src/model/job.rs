//! Job data model.
//!
//! A job is a unit of deferred work. It has a type tag that selects the
//! handler, an opaque JSON payload, a lifecycle status, and a bounded
//! retry budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A job record as held by the job store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,

    /// Type tag (e.g. "drive.sync_folder"). Selects the handler.
    pub job_type: String,

    /// Handler input. The engine never interprets this.
    pub payload: serde_json::Value,

    pub status: JobStatus,

    /// Failed attempts that were sent back to PENDING.
    pub retries: u32,

    /// Retry budget. `retries` never exceeds this.
    pub max_retries: u32,

    /// Message of the most recent failure.
    pub error: Option<String>,

    /// Not eligible for processing before this instant.
    pub run_after: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Build a fresh PENDING job from a submission.
    pub fn from_new(new: NewJob, default_max_retries: u32, now: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            job_type: new.job_type,
            payload: new.payload,
            status: JobStatus::Pending,
            retries: 0,
            max_retries: new.max_retries.unwrap_or(default_max_retries),
            error: None,
            run_after: now,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Whether a failure now should send the job back to PENDING.
    pub fn has_retries_left(&self) -> bool {
        self.retries < self.max_retries
    }
}

/// Newtype for job IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(JobId)
            .map_err(|e| Error::Other(format!("invalid job id '{s}': {e}")))
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by the engine, handler running.
    Processing,
    /// Handler succeeded. Terminal.
    Completed,
    /// Unroutable, rejected, or out of retries. Terminal.
    Failed,
}

impl JobStatus {
    /// Can transition from self to `to`?
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Pending) // retry
                | (Processing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Processing => "PROCESSING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(JobStatus::Pending),
            "PROCESSING" => Ok(JobStatus::Processing),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            _ => Err(Error::Other(format!("unknown job status: {s}"))),
        }
    }
}

/// Validate a status transition, returning an error if disallowed.
pub fn validate_transition(from: JobStatus, to: JobStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(Error::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Builder for submitting a job.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub(crate) job_type: String,
    pub(crate) payload: serde_json::Value,
    pub(crate) max_retries: Option<u32>,
}

impl NewJob {
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            max_retries: None,
        }
    }

    /// Override the configured retry budget for this job.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn job_type(&self) -> &str {
        &self.job_type
    }

    /// Reject a payload that does not decode for its known job type.
    /// Types outside [`JobPayload::TYPES`] are not checked.
    pub fn check_payload(&self) -> Result<()> {
        if JobPayload::TYPES.contains(&self.job_type.as_str()) {
            JobPayload::decode(&self.job_type, &self.payload)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Typed payloads
// ---------------------------------------------------------------------------

/// Type tag for the folder-sync handler.
pub const FOLDER_SYNC: &str = "drive.sync_folder";
/// Type tag for the SEO text handler.
pub const SEO_TEXT: &str = "vehicle.seo_text";
/// Type tag for the invite email handler.
pub const INVITE: &str = "user.invite";

/// Mirror a remote folder into a vehicle's media list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSyncPayload {
    pub vin: String,
    pub folder_id: String,
}

/// Regenerate a vehicle's listing description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoTextPayload {
    pub vin: String,
}

/// Invite a new user to the dealership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitePayload {
    pub email: String,
    pub name: Option<String>,
    pub role: String,
    pub invited_by: String,
    pub accept_url: String,
}

/// Every job kind the system knows how to enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobPayload {
    FolderSync(FolderSyncPayload),
    SeoText(SeoTextPayload),
    Invite(InvitePayload),
}

impl JobPayload {
    /// Type tags of every built-in job kind.
    pub const TYPES: [&'static str; 3] = [FOLDER_SYNC, SEO_TEXT, INVITE];

    pub fn job_type(&self) -> &'static str {
        match self {
            JobPayload::FolderSync(_) => FOLDER_SYNC,
            JobPayload::SeoText(_) => SEO_TEXT,
            JobPayload::Invite(_) => INVITE,
        }
    }

    /// Serialize into a store-ready submission.
    pub fn into_new_job(self) -> Result<NewJob> {
        let job_type = self.job_type();
        let payload = match self {
            JobPayload::FolderSync(p) => serde_json::to_value(p)?,
            JobPayload::SeoText(p) => serde_json::to_value(p)?,
            JobPayload::Invite(p) => serde_json::to_value(p)?,
        };
        Ok(NewJob::new(job_type, payload))
    }

    /// Decode a stored job back into its typed payload.
    pub fn decode(job_type: &str, payload: &serde_json::Value) -> Result<Self> {
        let decoded = match job_type {
            FOLDER_SYNC => JobPayload::FolderSync(serde_json::from_value(payload.clone())?),
            SEO_TEXT => JobPayload::SeoText(serde_json::from_value(payload.clone())?),
            INVITE => JobPayload::Invite(serde_json::from_value(payload.clone())?),
            other => return Err(Error::Other(format!("unknown job type: {other}"))),
        };
        Ok(decoded)
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Filters for listing jobs.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminal_states_have_no_exits() {
        use JobStatus::*;
        for to in [Pending, Processing, Completed, Failed] {
            assert!(!Completed.can_transition_to(to));
            assert!(!Failed.can_transition_to(to));
        }
    }

    #[test]
    fn pending_only_moves_to_processing() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
    }

    #[test]
    fn status_round_trips_through_text() {
        for s in ["PENDING", "processing", "Completed", "FAILED"] {
            let status: JobStatus = s.parse().unwrap();
            assert_eq!(status.as_str(), s.to_ascii_uppercase());
        }
        assert!("DEAD".parse::<JobStatus>().is_err());
    }

    #[test]
    fn typed_payload_carries_its_tag() {
        let new = JobPayload::SeoText(SeoTextPayload {
            vin: "1HGCM82633A004352".into(),
        })
        .into_new_job()
        .unwrap();
        assert_eq!(new.job_type(), SEO_TEXT);
        assert_eq!(new.payload, json!({"vin": "1HGCM82633A004352"}));
    }

    #[test]
    fn check_payload_validates_known_types_only() {
        let ok = NewJob::new(SEO_TEXT, json!({"vin": "1HGCM82633A004352"}));
        assert!(ok.check_payload().is_ok());

        let bad = NewJob::new(INVITE, json!({"email": "sam@example.com"}));
        assert!(bad.check_payload().is_err());

        let custom = NewJob::new("reports.nightly", json!("anything"));
        assert!(custom.check_payload().is_ok());
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        let err = JobPayload::decode(FOLDER_SYNC, &json!({"vin": 7}));
        assert!(err.is_err());
    }
}
