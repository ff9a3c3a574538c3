//! # lotq
//!
//! Background job queue and domain-event core for the dealer-management
//! system.
//!
//! Provides a Postgres-backed job store with a single-flight polling engine
//! and bounded retries ([`queue`]), a synchronous domain event bus with
//! audit mirroring ([`events`]), the job handlers for folder sync, listing
//! descriptions and invites ([`workers`]), and OpenTelemetry observability.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod llm;
pub mod model;
pub mod queue;
pub mod services;
pub mod store;
pub mod telemetry;
pub mod workers;
