//! Job queue engine: handler registry, single-flight processing, retries.
//!
//! At most one job is in flight per [`JobQueue`]. Processing is driven by a
//! fixed-interval poll in [`JobQueue::run`] and by a detached kick after each
//! enqueue. A slow handler delays every job behind it.

pub mod backoff;
pub mod handler;

pub use backoff::Backoff;
pub use handler::{FnHandler, HandlerError, JobHandler, handler_fn};

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::error::{Error, Result};
use crate::model::job::{Job, JobFilter, JobId, JobPayload, JobStatus, NewJob};
use crate::store::JobStore;
use crate::telemetry::job::{record_transition, start_job_span};
use crate::telemetry::metrics;
use handler::{ErasedHandler, Typed};

/// Floor for [`QueueConfig::poll_interval`] in [`JobQueue::run`].
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

const INTERRUPTED: &str = "interrupted before completion";
const UNRECORDED: &str = "outcome was not recorded";

/// Engine tunables.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Interval between polls of the job store.
    pub poll_interval: Duration,
    /// Retry budget for jobs enqueued without an override.
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Start a detached processing pass after each enqueue.
    pub kick_on_enqueue: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_retries: 3,
            backoff: Backoff::default(),
            kick_on_enqueue: true,
        }
    }
}

/// Result of one [`JobQueue::process_next`] call.
#[derive(Debug)]
pub enum Tick {
    /// Another job is in flight; nothing was claimed.
    Busy,
    /// No eligible PENDING job.
    Idle,
    /// A job was claimed and settled. Carries its resulting record.
    Processed(Box<Job>),
}

/// Clears the in-flight flag on drop, including on early return.
struct FlightGuard<'a>(&'a AtomicBool);

impl<'a> FlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct JobQueue {
    store: Arc<dyn JobStore>,
    handlers: RwLock<HashMap<String, Arc<dyn ErasedHandler>>>,
    config: QueueConfig,
    in_flight: AtomicBool,
    /// Set when a claimed job's outcome could not be written.
    unsettled: AtomicBool,
    shutdown: Notify,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, config: QueueConfig) -> Self {
        Self {
            store,
            handlers: RwLock::new(HashMap::new()),
            config,
            in_flight: AtomicBool::new(false),
            unsettled: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Registration
    // -----------------------------------------------------------------------

    /// Associate `job_type` with `handler`. A later registration for the
    /// same type replaces the earlier one. Jobs already PENDING for the type
    /// are picked up on the next pass.
    pub fn register<H: JobHandler>(&self, job_type: impl Into<String>, handler: H) {
        let job_type = job_type.into();
        let erased: Arc<dyn ErasedHandler> = Arc::new(Typed(handler));
        let replaced = match self.handlers.write() {
            Ok(mut map) => map.insert(job_type.clone(), erased).is_some(),
            Err(poisoned) => poisoned
                .into_inner()
                .insert(job_type.clone(), erased)
                .is_some(),
        };
        if replaced {
            info!(job_type = %job_type, "replaced job handler");
        } else {
            info!(job_type = %job_type, "registered job handler");
        }
    }

    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = match self.handlers.read() {
            Ok(map) => map.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        };
        types.sort();
        types
    }

    fn handler_for(&self, job_type: &str) -> Option<Arc<dyn ErasedHandler>> {
        match self.handlers.read() {
            Ok(map) => map.get(job_type).cloned(),
            Err(poisoned) => poisoned.into_inner().get(job_type).cloned(),
        }
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Store a PENDING job and return its id. The row is durable before this
    /// returns; when it runs is not guaranteed.
    pub async fn enqueue(
        self: &Arc<Self>,
        job_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<JobId> {
        self.enqueue_new(NewJob::new(job_type, payload)).await
    }

    /// Enqueue one of the known job kinds.
    pub async fn enqueue_job(self: &Arc<Self>, payload: JobPayload) -> Result<JobId> {
        self.enqueue_new(payload.into_new_job()?).await
    }

    pub async fn enqueue_new(self: &Arc<Self>, new: NewJob) -> Result<JobId> {
        let job_type = new.job_type().to_string();
        let job = self.store.insert_job(new, self.config.max_retries).await?;

        metrics::jobs_enqueued().add(1, &[KeyValue::new("job_type", job_type.clone())]);
        info!(job_id = %job.id, job_type = %job_type, "job enqueued");

        if self.config.kick_on_enqueue {
            self.kick();
        }
        Ok(job.id)
    }

    /// Start a detached processing pass. Never blocks the caller.
    fn kick(self: &Arc<Self>) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = queue.drain().await {
                error!(error = %e, "job queue pass failed");
            }
        });
    }

    // -----------------------------------------------------------------------
    // Processing
    // -----------------------------------------------------------------------

    /// Claim and settle the oldest eligible PENDING job, unless another job
    /// is already in flight.
    ///
    /// If a previous pass claimed a job but failed to record its outcome,
    /// that job is first released as a failed attempt.
    pub async fn process_next(&self) -> Result<Tick> {
        let Some(_guard) = FlightGuard::acquire(&self.in_flight) else {
            debug!("job already in flight");
            return Ok(Tick::Busy);
        };

        if self.unsettled.load(Ordering::Acquire) {
            let released = self.settle_stuck(UNRECORDED).await?;
            self.unsettled.store(false, Ordering::Release);
            warn!(released, "released jobs whose outcome was not recorded");
        }

        let Some(job) = self.store.claim_next(Utc::now()).await? else {
            return Ok(Tick::Idle);
        };

        let span = start_job_span(&job);
        transition(&span, JobStatus::Pending, JobStatus::Processing);

        match self.execute(job, &span).instrument(span.clone()).await {
            Ok(settled) => Ok(Tick::Processed(Box::new(settled))),
            Err(e) => {
                // The job is still PROCESSING; no claim will ever select it.
                self.unsettled.store(true, Ordering::Release);
                error!(error = %e, "could not record job outcome");
                Err(e)
            }
        }
    }

    /// Process jobs until none is eligible or another pass holds the flight.
    /// Returns how many jobs were settled.
    pub async fn drain(&self) -> Result<usize> {
        let mut settled = 0;
        while let Tick::Processed(_) = self.process_next().await? {
            settled += 1;
        }
        Ok(settled)
    }

    /// Run the handler for a claimed job and record the outcome.
    async fn execute(&self, job: Job, span: &Span) -> Result<Job> {
        let Some(handler) = self.handler_for(&job.job_type) else {
            warn!(job_type = %job.job_type, "no handler registered, failing job");
            metrics::jobs_unroutable().add(1, &[KeyValue::new("job_type", job.job_type.clone())]);
            let msg = format!("no handler registered for job type '{}'", job.job_type);
            let failed = self.store.fail_job(job.id, &msg).await?;
            transition(span, JobStatus::Processing, JobStatus::Failed);
            return Ok(failed);
        };

        let started = Instant::now();
        let payload = job.payload.clone();
        // Own task so a panicking handler surfaces as a JoinError.
        let result = tokio::spawn(async move { handler.call(payload).await }.in_current_span())
            .await
            .unwrap_or_else(|e| Err(HandlerError::Transient(format!("handler panicked: {e}"))));
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let outcome = if result.is_ok() { "ok" } else { "error" };
        metrics::job_duration_ms().record(
            elapsed_ms,
            &[
                KeyValue::new("job_type", job.job_type.clone()),
                KeyValue::new("outcome", outcome),
            ],
        );

        match result {
            Ok(()) => {
                let done = self.store.complete_job(job.id).await?;
                transition(span, JobStatus::Processing, JobStatus::Completed);
                info!(elapsed_ms, "job completed");
                Ok(done)
            }
            Err(e) => self.settle_failure(job, &e, span).await,
        }
    }

    /// Send a failed attempt back to PENDING or on to FAILED.
    async fn settle_failure(&self, job: Job, err: &HandlerError, span: &Span) -> Result<Job> {
        let msg = err.to_string();
        if err.is_retryable() && job.has_retries_left() {
            let retry = job.retries + 1;
            let run_after = self.config.backoff.eligible_at(Utc::now(), retry);
            let requeued = self.store.retry_job(job.id, &msg, run_after).await?;
            transition(span, JobStatus::Processing, JobStatus::Pending);
            warn!(
                error = %msg,
                retry,
                max_retries = job.max_retries,
                %run_after,
                "job failed, will retry"
            );
            Ok(requeued)
        } else {
            let failed = self.store.fail_job(job.id, &msg).await?;
            transition(span, JobStatus::Processing, JobStatus::Failed);
            error!(
                error = %msg,
                retries = job.retries,
                retryable = err.is_retryable(),
                "job failed permanently"
            );
            Ok(failed)
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Poll the store every `poll_interval` until [`shutdown`](Self::shutdown).
    /// Errors inside a pass are logged; the loop keeps going.
    pub async fn run(&self) -> Result<()> {
        let period = self.config.poll_interval.max(MIN_POLL_INTERVAL);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            poll_interval_ms = period.as_millis() as u64,
            handlers = ?self.registered_types(),
            "job queue started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("job queue shutting down");
                    return Ok(());
                }
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.drain().await {
                error!(error = %e, "job queue pass failed");
            }
        }
    }

    /// Signal [`run`](Self::run) to return after the current pass.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Settle jobs left PROCESSING by a previous process as failed attempts.
    ///
    /// Call once at startup, before [`run`](Self::run).
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let count = self.settle_stuck(INTERRUPTED).await?;
        if count > 0 {
            warn!(count, "recovered interrupted jobs");
        }
        Ok(count)
    }

    /// Settle every PROCESSING job as a failed attempt with `reason`.
    async fn settle_stuck(&self, reason: &str) -> Result<usize> {
        let stuck = self
            .store
            .list_jobs(&JobFilter {
                status: Some(JobStatus::Processing),
                job_type: None,
                limit: None,
            })
            .await?;

        let err = HandlerError::Transient(reason.to_string());
        let count = stuck.len();
        for job in stuck {
            let span = start_job_span(&job);
            self.settle_failure(job, &err, &span)
                .instrument(span.clone())
                .await?;
        }
        Ok(count)
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub async fn get(&self, id: JobId) -> Result<Job> {
        self.store.get_job(id).await
    }

    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        self.store.list_jobs(filter).await
    }

    /// Enqueue a fresh copy of a FAILED job. The failed row is untouched.
    pub async fn requeue(self: &Arc<Self>, id: JobId) -> Result<JobId> {
        let job = self.store.get_job(id).await?;
        if job.status != JobStatus::Failed {
            return Err(Error::Other(format!(
                "job {id} is {}, only FAILED jobs can be requeued",
                job.status
            )));
        }
        let new_id = self
            .enqueue_new(NewJob::new(job.job_type, job.payload).max_retries(job.max_retries))
            .await?;
        info!(original = %id, job_id = %new_id, "job requeued");
        Ok(new_id)
    }
}

fn transition(span: &Span, from: JobStatus, to: JobStatus) {
    record_transition(span, from, to);
    metrics::job_state_transitions().add(
        1,
        &[
            KeyValue::new("from", from.as_str()),
            KeyValue::new("to", to.as_str()),
        ],
    );
}
