//! Core data model.
//!
//! Jobs are deferred work with a lifecycle; domain events are synchronous
//! notifications; history and audit entries are the append-only facts
//! derived from both.

pub mod event;
pub mod history;
pub mod job;
pub mod vehicle;
