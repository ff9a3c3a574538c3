//! Metric instrument factories.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Without one installed, every instrument is a no-op.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("lotq")
}

/// Counter: jobs enqueued.
/// Labels: `job_type`.
pub fn jobs_enqueued() -> Counter<u64> {
    meter()
        .u64_counter("lotq.jobs.enqueued")
        .with_description("Number of jobs enqueued")
        .build()
}

/// Counter: job status transitions.
/// Labels: `from`, `to`.
pub fn job_state_transitions() -> Counter<u64> {
    meter()
        .u64_counter("lotq.jobs.state_transitions")
        .with_description("Number of job status transitions")
        .build()
}

/// Counter: jobs failed because no handler is registered for their type.
/// Labels: `job_type`.
pub fn jobs_unroutable() -> Counter<u64> {
    meter()
        .u64_counter("lotq.jobs.unroutable")
        .with_description("Jobs with no registered handler")
        .build()
}

/// Histogram: handler execution time in milliseconds.
/// Labels: `job_type`, `outcome`.
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("lotq.jobs.duration_ms")
        .with_description("Job handler duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: domain events emitted.
/// Labels: `event`.
pub fn events_emitted() -> Counter<u64> {
    meter()
        .u64_counter("lotq.events.emitted")
        .with_description("Number of domain events emitted")
        .build()
}

/// Counter: listener invocations that returned an error.
/// Labels: `event`, `listener`.
pub fn listener_failures() -> Counter<u64> {
    meter()
        .u64_counter("lotq.events.listener_failures")
        .with_description("Listener invocations that failed")
        .build()
}

/// Counter: detached audit writes that failed.
/// Labels: `event`.
pub fn audit_write_failures() -> Counter<u64> {
    meter()
        .u64_counter("lotq.audit.write_failures")
        .with_description("Audit sink writes that failed")
        .build()
}
