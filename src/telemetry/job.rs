//! Job execution span helpers.

use tracing::Span;

use crate::model::job::{Job, JobStatus};

/// Start a span covering one job attempt.
///
/// `job.status` is declared empty and filled by [`record_transition`].
pub fn start_job_span(job: &Job) -> Span {
    tracing::info_span!(
        "job.execute",
        "job.type" = %job.job_type,
        "job.id" = %job.id,
        "job.attempt" = job.retries + 1,
        "job.status" = tracing::field::Empty,
    )
}

/// Record a status transition on the span and as an event inside it.
pub fn record_transition(span: &Span, from: JobStatus, to: JobStatus) {
    span.record("job.status", to.as_str());
    span.in_scope(|| {
        tracing::info!(from = from.as_str(), to = to.as_str(), "state_transition");
    });
}
