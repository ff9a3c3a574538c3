//! Integration tests for telemetry initialization and span helpers.

use chrono::Utc;
use serde_json::json;

use lotq::model::job::{Job, JobStatus, NewJob};
use lotq::telemetry::job::{record_transition, start_job_span};

#[test]
fn telemetry_initializes_without_endpoint() {
    // Note: tracing subscriber can only be set once per process.
    // Using try_init() in the implementation avoids panics if another
    // test already initialized a subscriber.
    let config = lotq::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "lotq-test".to_string(),
        log_level: "debug".to_string(),
    };
    let _guard = lotq::telemetry::init_telemetry(config);
}

#[test]
fn job_span_creates_and_records_transition() {
    let job = Job::from_new(NewJob::new("vehicle.seo_text", json!({"vin": "X"})), 3, Utc::now());
    let span = start_job_span(&job);
    record_transition(&span, JobStatus::Pending, JobStatus::Processing);
    record_transition(&span, JobStatus::Processing, JobStatus::Completed);
}

#[test]
fn metric_instruments_are_usable_without_exporter() {
    lotq::telemetry::metrics::jobs_enqueued().add(1, &[]);
    lotq::telemetry::metrics::job_duration_ms().record(1.5, &[]);
    lotq::telemetry::metrics::events_emitted().add(1, &[]);
}
